//! HTTP routes for the backend service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    http_metrics_middleware, parse_claims, require_role, AuthState, RequiredRole,
};
use crate::repositories::ItemRepository;
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Item storage.
    pub items: Arc<dyn ItemRepository>,
}

/// Build the application routes.
///
/// - `/public` - no authentication
/// - `/health` - liveness probe
/// - `/metrics` - Prometheus scrape endpoint
/// - `/profile` - parsed claims required
/// - `/user` - role `user` required
/// - `/admin` - role `admin` required
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        roles_claim: state.config.roles_claim.clone(),
    });

    let public_routes = Router::new()
        .route("/public", get(handlers::public))
        .route("/health", get(handlers::health_check));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let user_routes = Router::new()
        .route("/user", get(handlers::user))
        .route_layer(middleware::from_fn_with_state(
            RequiredRole("user"),
            require_role,
        ));

    let admin_routes = Router::new()
        .route("/admin", get(handlers::admin))
        .route_layer(middleware::from_fn_with_state(
            RequiredRole("admin"),
            require_role,
        ));

    // parse_claims wraps require_role, so it runs first.
    let protected_routes = Router::new()
        .route("/profile", get(handlers::profile))
        .merge(user_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(auth_state, parse_claims))
        .with_state(state);

    // Each .layer() wraps everything above it:
    // 1. TraceLayer (innermost)
    // 2. TimeoutLayer
    // 3. http_metrics_middleware (outermost, sees every response including timeouts)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(middleware::from_fn(http_metrics_middleware))
}
