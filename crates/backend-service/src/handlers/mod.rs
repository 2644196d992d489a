//! HTTP request handlers for the backend service.

pub mod endpoints;
pub mod health;
pub mod metrics;

pub use endpoints::{admin, profile, public, user};
pub use health::health_check;
pub use metrics::metrics_handler;
