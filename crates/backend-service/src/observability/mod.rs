//! Observability for the backend service.
//!
//! Provides metrics definitions used by the HTTP and authorization middleware.

pub mod metrics;
