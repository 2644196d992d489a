//! Stack connection and readiness checks.
//!
//! `ClusterConnection` validates that the identity provider and both gateway
//! listeners are reachable before any test talks to them.

use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;

/// Realm the demo stack provisions against.
pub const DEFAULT_REALM: &str = "demo-realm";

/// Stack connection errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Nothing listening on localhost:{port} ({component}). Start the stack with 'docker compose up'")]
    PortNotReachable { component: &'static str, port: u16 },

    #[error("Readiness check failed: {message}")]
    NotReady { message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Default port configuration for the local stack.
#[derive(Debug, Clone)]
pub struct ClusterPorts {
    pub identity_provider: u16,
    pub gateway_proxy: u16,
    pub gateway_admin: u16,
    /// The backend is normally only reachable through the gateway.
    pub backend: Option<u16>,
}

impl Default for ClusterPorts {
    fn default() -> Self {
        Self {
            identity_provider: 8080,
            gateway_proxy: 8000,
            gateway_admin: 8001,
            backend: None,
        }
    }
}

/// Connection to the running stack.
pub struct ClusterConnection {
    pub idp_base_url: String,
    pub realm: String,
    pub gateway_url: String,
    pub gateway_admin_url: String,
    pub backend_base_url: Option<String>,
    http_client: reqwest::Client,
}

impl ClusterConnection {
    /// Connect with default ports and realm.
    ///
    /// `ENV_TEST_REALM` overrides the realm. `ENV_TEST_BACKEND_PORT` makes the
    /// backend's own listener available for direct health checks.
    pub async fn new() -> Result<Self, ClusterError> {
        let backend = std::env::var("ENV_TEST_BACKEND_PORT")
            .ok()
            .and_then(|p| p.parse().ok());
        let realm = std::env::var("ENV_TEST_REALM").unwrap_or_else(|_| DEFAULT_REALM.to_string());

        Self::new_with_ports(
            ClusterPorts {
                backend,
                ..ClusterPorts::default()
            },
            realm,
        )
        .await
    }

    /// Connect with custom ports.
    pub async fn new_with_ports(
        ports: ClusterPorts,
        realm: impl Into<String>,
    ) -> Result<Self, ClusterError> {
        Self::check_tcp_port("identity provider", ports.identity_provider)?;
        Self::check_tcp_port("gateway proxy", ports.gateway_proxy)?;
        Self::check_tcp_port("gateway admin", ports.gateway_admin)?;

        let backend_base_url = match ports.backend {
            Some(port) => {
                Self::check_tcp_port("backend", port)?;
                Some(format!("http://localhost:{}", port))
            }
            None => None,
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClusterError::NotReady {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            idp_base_url: format!("http://localhost:{}", ports.identity_provider),
            realm: realm.into(),
            gateway_url: format!("http://localhost:{}", ports.gateway_proxy),
            gateway_admin_url: format!("http://localhost:{}", ports.gateway_admin),
            backend_base_url,
            http_client,
        })
    }

    /// Check if a TCP port is reachable on localhost (5s timeout).
    fn check_tcp_port(component: &'static str, port: u16) -> Result<(), ClusterError> {
        let addr = format!("127.0.0.1:{}", port);

        TcpStream::connect_timeout(
            &addr.parse().map_err(|_| ClusterError::NotReady {
                message: format!("Invalid address: {}", addr),
            })?,
            Duration::from_secs(5),
        )
        .map_err(|_| ClusterError::PortNotReachable { component, port })?;

        Ok(())
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Issuer URL tokens from this realm carry in `iss`.
    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{}", self.idp_base_url, self.realm)
    }

    /// Public-key discovery endpoint of the realm.
    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer_url())
    }

    /// The identity provider is ready once its realm serves a key set.
    pub async fn check_idp_ready(&self) -> Result<(), ClusterError> {
        self.expect_success("Identity provider JWKS", &self.jwks_url())
            .await
    }

    /// Gateway admin readiness probe.
    pub async fn check_gateway_status(&self) -> Result<(), ClusterError> {
        let url = format!("{}/status", self.gateway_admin_url);
        self.expect_success("Gateway /status", &url).await
    }

    /// Backend health on its own listener. Skipped (Ok) when the backend port
    /// is not exposed.
    pub async fn check_backend_health(&self) -> Result<(), ClusterError> {
        match &self.backend_base_url {
            Some(base) => {
                self.expect_success("Backend /health", &format!("{}/health", base))
                    .await
            }
            None => Ok(()),
        }
    }

    async fn expect_success(&self, what: &str, url: &str) -> Result<(), ClusterError> {
        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClusterError::NotReady {
                message: format!("{} returned status {}", what, response.status()),
            });
        }

        Ok(())
    }
}
