//! # Provisioner Test Utilities
//!
//! Shared test utilities for the trust provisioner.
//!
//! This crate provides:
//! - Deterministic RSA keys and key-set documents (`test_rsa_key`, `jwks`)
//! - Signed access-token builder (`TestTokenBuilder`)
//! - Identity provider double serving a key set (`FakeIdentityProvider`)
//! - Gateway double with an admin API and an enforcing proxy (`FakeGateway`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use provisioner_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let key = test_rsa_key(1);
//!     let idp = FakeIdentityProvider::serving(jwks(vec![key.signing_jwk()])).await;
//!     let gateway = FakeGateway::start().await?;
//!
//!     // ... run provisioning against idp.jwks_url() and gateway.admin_url() ...
//!
//!     let token = TestTokenBuilder::new().issued_by(&idp.issuer_url()).sign(&key);
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/admin", gateway.proxy_url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod fake_gateway;
pub mod identity_provider;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use fake_gateway::*;
pub use identity_provider::*;
pub use token_builders::*;
