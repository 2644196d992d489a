//! Secret wrappers for credentials that must never reach a log line.
//!
//! Re-exports [`secrecy`] types. Two credentials flow through this workspace:
//!
//! - the gateway admin token the provisioner sends on every admin API call
//! - identity-provider user passwords used by the live-stack test fixtures
//!
//! Both are held as [`SecretString`], so structs deriving `Debug` stay safe to
//! log and reading the value requires an explicit `expose_secret()`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct AdminCredentials {
//!     admin_url: String,
//!     admin_token: SecretString,
//! }
//!
//! let creds = AdminCredentials {
//!     admin_url: "http://localhost:8001".to_string(),
//!     admin_token: SecretString::from("kong-admin-token"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("kong-admin-token"));
//! assert_eq!(creds.admin_token.expose_secret(), "kong-admin-token");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
