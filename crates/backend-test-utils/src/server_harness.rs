//! Test server harness for E2E testing
//!
//! Provides `TestBackendServer` for spawning real backend instances in tests.

use backend_service::config::Config;
use backend_service::observability::metrics::init_metrics_recorder;
use backend_service::repositories::{InMemoryItemRepository, ItemRepository, PgItemRepository};
use backend_service::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Process-wide metrics handle; the global recorder can only be installed once.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the backend in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestBackendServer::spawn_in_memory().await?;
/// let response = reqwest::get(format!("{}/public", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestBackendServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestBackendServer {
    /// Spawn with an empty in-memory item store and the default roles claim.
    pub async fn spawn_in_memory() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(InMemoryItemRepository::new()), &[]).await
    }

    /// Spawn against a Postgres pool (typically from `#[sqlx::test]`).
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(PgItemRepository::new(pool)), &[]).await
    }

    /// Spawn with a given item store and extra configuration variables,
    /// e.g. `&[("ROLES_CLAIM", "realm_access.roles")]`.
    pub async fn spawn_with(
        items: Arc<dyn ItemRepository>,
        extra_vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (key, value) in extra_vars {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState {
            config: config.clone(),
            items,
        });

        let app = routes::build_routes(state, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestBackendServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
