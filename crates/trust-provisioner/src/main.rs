//! Trust Provisioner
//!
//! One-shot job run before user traffic: registers the identity provider's
//! signing key with the gateway and enables verification on protected routes.
//! Exits non-zero naming the failed step.

use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trust_provisioner::config::Config;
use trust_provisioner::discovery::DiscoveryClient;
use trust_provisioner::errors::ProvisionError;
use trust_provisioner::gateway::AdminClient;
use trust_provisioner::http::build_http_client;
use trust_provisioner::models::default_routes;
use trust_provisioner::provisioning::{self, ProvisionReport};

#[tokio::main]
async fn main() -> ExitCode {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trust_provisioner=info,provisioner=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    info!(target: "provisioner", "Starting trust provisioner");

    match provision().await {
        Ok(report) => {
            info!(
                target: "provisioner",
                kid = %report.key_id,
                owner_identity = %report.owner_identity,
                enforced_routes = ?report.enforced_routes,
                "Provisioning complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                target: "provisioner",
                step = %e.failed_step(),
                response_body = e.response_body().unwrap_or_default(),
                error = %e,
                "Provisioning failed"
            );
            ExitCode::FAILURE
        }
    }
}

async fn provision() -> Result<ProvisionReport, ProvisionError> {
    let config = Config::from_env()?;

    info!(
        target: "provisioner",
        issuer = %config.idp_issuer_url,
        jwks_url = %config.idp_jwks_url,
        gateway_admin_url = %config.gateway_admin_url,
        service = %config.service.name,
        upstream = %config.service.upstream_url,
        join_key = config.join_key.claim_name(),
        "Configuration loaded successfully"
    );

    let http_client = build_http_client(config.http_timeout)
        .map_err(|e| ProvisionError::HttpClient(e.to_string()))?;

    let discovery = DiscoveryClient::new(http_client.clone(), config.discovery_retry);
    let admin = AdminClient::new(
        http_client,
        config.gateway_admin_url.clone(),
        config.gateway_admin_token.clone(),
    );

    provisioning::run(&config, &discovery, &admin, &default_routes()).await
}
