//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated so Prometheus can scrape it. The gateway has no route to
//! it, so it is only reachable inside the deployment network.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// ```text
/// # TYPE backend_authz_decisions_total counter
/// backend_authz_decisions_total{outcome="forbidden"} 3
/// ```
#[tracing::instrument(skip_all, name = "backend.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
