//! Backend Service Library
//!
//! HTTP backend behind the API gateway. The gateway verifies bearer token
//! signatures; this service reads the forwarded claims and enforces
//! per-endpoint roles.
//!
//! # Modules
//!
//! - `auth` - Forwarded-claims parsing
//! - `config` - Service configuration
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Claims parsing and role enforcement layers
//! - `observability` - Metrics
//! - `repositories` - Item storage
//! - `routes` - Router and application state

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod repositories;
pub mod routes;
