//! # Backend Test Utilities
//!
//! Shared test utilities for the backend service.
//!
//! This crate provides:
//! - Server test harness (`TestBackendServer` for E2E tests)
//! - Forwarded-token builder (`TestClaimsBuilder`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use backend_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestBackendServer::spawn_in_memory().await?;
//!     let token = TestClaimsBuilder::new().with_roles(&["admin"]).unsigned_token();
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/admin", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod claims_builder;
pub mod server_harness;

// Re-export commonly used items
pub use claims_builder::*;
pub use server_harness::*;
