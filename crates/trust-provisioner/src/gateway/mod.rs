//! Gateway administrative API.
//!
//! The registrar and enforcement configurator only ever need three verbs
//! against the admin API: probe readiness, delete a resource (404 tolerated),
//! and create a resource from a JSON body. [`GatewayAdmin`] captures exactly
//! that so the provisioning protocol can be driven against a recording mock.

mod admin_client;

pub use admin_client::{AdminClient, ADMIN_TOKEN_HEADER};

use std::fmt;
use thiserror::Error;

use crate::retry::Transient;

/// A failed admin API call, before step context is attached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdminCallError {
    /// The gateway answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No usable response (connect failure, timeout, unreadable body).
    #[error("{0}")]
    Transport(String),
}

impl Transient for AdminCallError {
    // Only consulted by the readiness poll, where every failure means
    // "not ready yet".
    fn is_transient(&self) -> bool {
        true
    }
}

/// Result of a 404-tolerant delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Path of an admin API resource as a list of unescaped segments.
///
/// Segments are percent-encoded when the request URL is built, so a credential
/// keyed by an issuer URL (which contains `/` and `:`) stays one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminPath {
    segments: Vec<String>,
}

impl AdminPath {
    fn from_segments(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn status() -> Self {
        Self::from_segments(&["status"])
    }

    pub fn services() -> Self {
        Self::from_segments(&["services"])
    }

    pub fn service(name: &str) -> Self {
        Self::from_segments(&["services", name])
    }

    pub fn service_routes(service: &str) -> Self {
        Self::from_segments(&["services", service, "routes"])
    }

    pub fn route(name: &str) -> Self {
        Self::from_segments(&["routes", name])
    }

    pub fn route_plugins(route: &str) -> Self {
        Self::from_segments(&["routes", route, "plugins"])
    }

    pub fn consumers() -> Self {
        Self::from_segments(&["consumers"])
    }

    pub fn consumer(username: &str) -> Self {
        Self::from_segments(&["consumers", username])
    }

    pub fn consumer_jwt(username: &str) -> Self {
        Self::from_segments(&["consumers", username, "jwt"])
    }

    pub fn consumer_jwt_credential(username: &str, key: &str) -> Self {
        Self::from_segments(&["consumers", username, "jwt", key])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

/// Unescaped form, for logs and error messages.
impl fmt::Display for AdminPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// The admin API operations the provisioning protocol uses.
#[async_trait::async_trait]
pub trait GatewayAdmin: Send + Sync {
    /// Readiness probe (`GET /status`). Any non-success is "not ready".
    async fn ready(&self) -> Result<(), AdminCallError>;

    /// Delete a resource. A 404 is reported as [`DeleteOutcome::NotFound`],
    /// not as an error.
    async fn delete(&self, path: &AdminPath) -> Result<DeleteOutcome, AdminCallError>;

    /// Create a resource by POSTing `body`. Returns the created object.
    async fn create(
        &self,
        path: &AdminPath,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AdminCallError>;
}

/// Recording admin API double for protocol tests.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// One recorded admin call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AdminCall {
        Ready,
        Delete(String),
        Create(String, serde_json::Value),
    }

    impl AdminCall {
        /// `"DELETE /routes/admin-route"` style summary.
        pub fn describe(&self) -> String {
            match self {
                AdminCall::Ready => "GET /status".to_string(),
                AdminCall::Delete(path) => format!("DELETE {path}"),
                AdminCall::Create(path, _) => format!("POST {path}"),
            }
        }
    }

    /// Records every call and answers successfully, unless told to fail one.
    #[derive(Default)]
    pub struct RecordingGatewayAdmin {
        calls: Mutex<Vec<AdminCall>>,
        fail_on: Option<(String, AdminCallError)>,
        missing: bool,
        not_ready_for: Mutex<u32>,
    }

    impl RecordingGatewayAdmin {
        /// Every call succeeds; deletes report `Deleted`.
        pub fn new() -> Self {
            Self::default()
        }

        /// Deletes report `NotFound` (fresh gateway).
        pub fn empty_gateway() -> Self {
            Self {
                missing: true,
                ..Self::default()
            }
        }

        /// The call whose [`AdminCall::describe`] equals `call` fails with `error`.
        pub fn failing_on(call: &str, error: AdminCallError) -> Self {
            Self {
                fail_on: Some((call.to_string(), error)),
                ..Self::default()
            }
        }

        /// The first `probes` readiness probes fail.
        pub fn not_ready_for(probes: u32) -> Self {
            Self {
                not_ready_for: Mutex::new(probes),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<AdminCall> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Recorded calls as `describe()` strings.
        pub fn described_calls(&self) -> Vec<String> {
            self.calls().iter().map(AdminCall::describe).collect()
        }

        fn record(&self, call: AdminCall) -> Result<(), AdminCallError> {
            let described = call.describe();
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
            match &self.fail_on {
                Some((target, error)) if *target == described => Err(error.clone()),
                _ => Ok(()),
            }
        }
    }

    #[async_trait::async_trait]
    impl GatewayAdmin for RecordingGatewayAdmin {
        async fn ready(&self) -> Result<(), AdminCallError> {
            self.record(AdminCall::Ready)?;
            let mut remaining = self
                .not_ready_for
                .lock()
                .map_err(|_| AdminCallError::Transport("mock poisoned".to_string()))?;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdminCallError::Status {
                    status: 503,
                    body: "starting".to_string(),
                });
            }
            Ok(())
        }

        async fn delete(&self, path: &AdminPath) -> Result<DeleteOutcome, AdminCallError> {
            self.record(AdminCall::Delete(path.to_string()))?;
            Ok(if self.missing {
                DeleteOutcome::NotFound
            } else {
                DeleteOutcome::Deleted
            })
        }

        async fn create(
            &self,
            path: &AdminPath,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, AdminCallError> {
            self.record(AdminCall::Create(path.to_string(), body.clone()))?;
            Ok(body.clone())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_path_display() {
        assert_eq!(AdminPath::status().to_string(), "/status");
        assert_eq!(
            AdminPath::service_routes("backend-service").to_string(),
            "/services/backend-service/routes"
        );
        assert_eq!(
            AdminPath::route_plugins("admin-route").to_string(),
            "/routes/admin-route/plugins"
        );
        assert_eq!(
            AdminPath::consumer_jwt_credential("identity-provider", "K1").to_string(),
            "/consumers/identity-provider/jwt/K1"
        );
    }

    #[test]
    fn test_issuer_key_stays_one_segment() {
        let path = AdminPath::consumer_jwt_credential(
            "identity-provider",
            "http://localhost:8080/realms/demo-realm",
        );

        assert_eq!(path.segments().len(), 4);
        assert_eq!(
            path.segments().last().unwrap(),
            "http://localhost:8080/realms/demo-realm"
        );
    }

    #[test]
    fn test_admin_call_error_display() {
        let err = AdminCallError::Status {
            status: 409,
            body: r#"{"message":"UNIQUE violation"}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"HTTP 409: {"message":"UNIQUE violation"}"#);
    }
}
