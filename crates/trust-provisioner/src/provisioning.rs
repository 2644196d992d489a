//! One provisioning run, start to finish.
//!
//! Sequential and run-to-completion: wait for the gateway, discover the
//! signing key, convert it, register trust, then enforce the protected routes.
//! Nothing is retried at this level; a failed run is recovered by running
//! again.

use crate::config::Config;
use crate::discovery::DiscoveryClient;
use crate::enforcement::EnforcementConfigurator;
use crate::errors::ProvisionError;
use crate::gateway::GatewayAdmin;
use crate::models::{RouteDescriptor, TrustBinding};
use crate::registrar::TrustRegistrar;
use crate::retry::{poll, PollError, RetryPolicy};
use tracing::instrument;

/// What a successful run configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub key_id: String,
    pub owner_identity: String,
    pub enforced_routes: Vec<String>,
}

/// Poll the admin API's readiness probe.
///
/// # Errors
///
/// `GatewayNotReady` with the last probe failure once the policy is exhausted.
pub async fn wait_for_gateway<G: GatewayAdmin + ?Sized>(
    admin: &G,
    policy: RetryPolicy,
) -> Result<(), ProvisionError> {
    poll(policy, "gateway readiness", || admin.ready())
        .await
        .map_err(|e| match e {
            PollError::Exhausted {
                attempts,
                last_error,
            } => ProvisionError::GatewayNotReady {
                attempts,
                last_error,
            },
            PollError::Permanent(last_error) => ProvisionError::GatewayNotReady {
                attempts: 1,
                last_error,
            },
        })?;

    tracing::info!(target: "provisioner.run", "Gateway admin API is ready");
    Ok(())
}

/// Execute a full provisioning run.
///
/// # Errors
///
/// Any [`ProvisionError`]; [`ProvisionError::failed_step`] names where it
/// stopped.
#[instrument(skip_all, name = "provisioner.run", fields(consumer = %config.consumer_name, join_key = ?config.join_key))]
pub async fn run<G: GatewayAdmin + ?Sized>(
    config: &Config,
    discovery: &DiscoveryClient,
    admin: &G,
    routes: &[RouteDescriptor],
) -> Result<ProvisionReport, ProvisionError> {
    wait_for_gateway(admin, config.gateway_ready_retry).await?;

    let signing_key = discovery.fetch_signing_key(&config.idp_jwks_url).await?;
    let public_key = signing_key.to_public_key()?;

    let binding = TrustBinding {
        owner_identity: config
            .join_key
            .owner_identity(&config.idp_issuer_url, &signing_key.key_id),
        key: public_key,
        algorithm: signing_key.algorithm,
    };

    TrustRegistrar::new(admin, &config.service, &config.consumer_name)
        .provision(&binding, routes)
        .await?;

    let enforced_routes = EnforcementConfigurator::new(admin, config.join_key)
        .enforce_protected(routes)
        .await?;

    Ok(ProvisionReport {
        key_id: signing_key.key_id,
        owner_identity: binding.owner_identity,
        enforced_routes,
    })
}
