//! Metrics definitions for the backend service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `backend_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: the routed paths plus `/other`
//! - `status`: success, error, timeout
//! - `outcome`: [`AuthzOutcome`] variants
//! - `operation`: bounded by code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by
/// `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("backend_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("backend_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `backend_http_requests_total`, `backend_http_request_duration_seconds`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("backend_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("backend_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Every routed path is static, so anything else collapses to `/other`.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/public" => "/public",
        "/profile" => "/profile",
        "/user" => "/user",
        "/admin" => "/admin",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Result of the authorization middleware for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzOutcome {
    /// No bearer token reached a protected route.
    Unauthenticated,
    /// Claims present but unusable.
    MalformedClaims,
    /// Required role present.
    Authorized,
    /// Required role absent.
    Forbidden,
}

impl AuthzOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthzOutcome::Unauthenticated => "unauthenticated",
            AuthzOutcome::MalformedClaims => "malformed_claims",
            AuthzOutcome::Authorized => "authorized",
            AuthzOutcome::Forbidden => "forbidden",
        }
    }
}

/// Metric: `backend_authz_decisions_total`
pub fn record_authz_decision(outcome: AuthzOutcome) {
    counter!("backend_authz_decisions_total", "outcome" => outcome.as_str()).increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Metric: `backend_db_queries_total`, `backend_db_query_duration_seconds`
pub fn record_db_query(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("backend_db_query_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("backend_db_queries_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(403), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/admin"), "/admin");
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/admin/extra"), "/other");
        assert_eq!(normalize_endpoint("/wp-login.php"), "/other");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_http_request("GET", "/user", 200, Duration::from_millis(3));
        record_authz_decision(AuthzOutcome::Forbidden);
        record_db_query("count_items", "success", Duration::from_millis(1));
    }

    #[test]
    fn test_authz_outcome_labels() {
        assert_eq!(AuthzOutcome::Unauthenticated.as_str(), "unauthenticated");
        assert_eq!(AuthzOutcome::MalformedClaims.as_str(), "malformed_claims");
        assert_eq!(AuthzOutcome::Authorized.as_str(), "authorized");
        assert_eq!(AuthzOutcome::Forbidden.as_str(), "forbidden");
    }
}
