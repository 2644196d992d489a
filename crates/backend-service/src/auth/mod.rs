//! Forwarded-claims handling.
//!
//! The backend never verifies token signatures; the gateway does that on
//! every protected route. This module only reads the claims it forwards.

pub mod claims;

pub use claims::{trust_upstream_claims, AuthenticatedClaims, ClaimsError, RolesClaim};
