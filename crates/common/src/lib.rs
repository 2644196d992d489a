//! Common utilities shared across the provisioner and the backend.

#![warn(clippy::pedantic)]

/// Module for JWT segment utilities (size cap, base64url, unverified decoding)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
