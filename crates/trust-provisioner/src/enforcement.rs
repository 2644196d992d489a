//! Enforcement Configurator.
//!
//! Attaches the gateway's JWT verification plugin to individual routes. A
//! route without the plugin proxies everything; a route with it rejects, with
//! 401 and before the backend sees the request, any token whose key claim
//! matches no registered credential or whose signature does not verify.
//!
//! Must run after the registrar has created the routes.

use crate::errors::{ProvisionError, ProvisionStep};
use crate::gateway::{AdminPath, GatewayAdmin};
use crate::models::{JoinKey, RouteDescriptor};
use serde_json::json;
use tracing::instrument;

/// Registered claims the gateway checks besides the signature.
pub const CLAIMS_TO_VERIFY: &[&str] = &["exp"];

pub struct EnforcementConfigurator<'a, G: GatewayAdmin + ?Sized> {
    admin: &'a G,
    join_key: JoinKey,
}

impl<'a, G: GatewayAdmin + ?Sized> EnforcementConfigurator<'a, G> {
    pub fn new(admin: &'a G, join_key: JoinKey) -> Self {
        Self { admin, join_key }
    }

    /// Plugin definition for this deployment's join key.
    pub fn plugin_config(&self) -> serde_json::Value {
        json!({
            "name": "jwt",
            "config": {
                "key_claim_name": self.join_key.claim_name(),
                "claims_to_verify": CLAIMS_TO_VERIFY,
            },
        })
    }

    /// Enable signature verification on one route.
    ///
    /// Does not look at `requires_signature_check`; callers decide which
    /// routes are protected.
    ///
    /// # Errors
    ///
    /// `AdminApi` / `AdminTransport` with an `EnforceRoute` step.
    #[instrument(skip_all, name = "provisioner.enforcement.enforce", fields(route = %route.name))]
    pub async fn enforce(&self, route: &RouteDescriptor) -> Result<(), ProvisionError> {
        let step = ProvisionStep::EnforceRoute(route.name.clone());

        self.admin
            .create(&AdminPath::route_plugins(&route.name), &self.plugin_config())
            .await
            .map_err(|e| {
                tracing::error!(target: "provisioner.enforcement", step = %step, error = %e, "Admin API call failed");
                ProvisionError::admin(step, e)
            })?;

        tracing::info!(
            target: "provisioner.enforcement",
            route = %route.name,
            path_prefix = %route.path_prefix,
            key_claim_name = self.join_key.claim_name(),
            "Signature verification enabled"
        );

        Ok(())
    }

    /// Enforce every route that requires a signature check, in input order.
    /// Public routes are skipped.
    ///
    /// Returns the names of the routes enforced.
    pub async fn enforce_protected(
        &self,
        routes: &[RouteDescriptor],
    ) -> Result<Vec<String>, ProvisionError> {
        let mut enforced = Vec::new();

        for route in routes.iter().filter(|r| r.requires_signature_check) {
            self.enforce(route).await?;
            enforced.push(route.name.clone());
        }

        Ok(enforced)
    }
}
