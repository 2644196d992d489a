//! Trust Provisioner
//!
//! Bootstraps trust between an identity provider and an API gateway: fetches
//! the provider's signing key, converts it to a PEM public key, and drives the
//! gateway admin API to route traffic to the backend and verify bearer tokens
//! on protected routes.
//!
//! # Modules
//!
//! - `config` - Environment configuration
//! - `discovery` - Key-set fetch and signing key selection
//! - `key_material` - JWK `(n, e)` to SubjectPublicKeyInfo PEM
//! - `gateway` - Admin API seam and its reqwest client
//! - `registrar` - Service/route/consumer/credential protocol
//! - `enforcement` - Per-route signature verification
//! - `provisioning` - One end-to-end run

pub mod config;
pub mod discovery;
pub mod enforcement;
pub mod errors;
pub mod gateway;
pub mod http;
pub mod key_material;
pub mod models;
pub mod provisioning;
pub mod registrar;
pub mod retry;
