//! HTTP middleware for the backend service.

pub mod auth;
pub mod http_metrics;

pub use auth::{parse_claims, require_role, AuthState, RequiredRole};
pub use http_metrics::http_metrics_middleware;
