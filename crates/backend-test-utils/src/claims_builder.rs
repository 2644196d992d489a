//! Builder for forwarded tokens
//!
//! The backend trusts the gateway's signature check, so tokens sent straight
//! to it in tests need a well-formed payload and nothing else.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Map, Value};

/// Builder for claims as the gateway would forward them.
///
/// # Example
/// ```rust,ignore
/// let token = TestClaimsBuilder::new()
///     .subject("bob")
///     .with_roles(&["admin"])
///     .unsigned_token();
/// ```
pub struct TestClaimsBuilder {
    claims: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Defaults: `sub = "test-subject"`, `roles = []`, `iat` now.
    pub fn new() -> Self {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("roles".to_string(), json!([]));
        claims.insert("iat".to_string(), json!(Utc::now().timestamp()));
        Self { claims }
    }

    pub fn subject(self, sub: &str) -> Self {
        self.with_claim("sub", json!(sub))
    }

    pub fn preferred_username(self, name: &str) -> Self {
        self.with_claim("preferred_username", json!(name))
    }

    /// Set the top-level `roles` array.
    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.with_claim("roles", json!(roles))
    }

    /// Set Keycloak's `realm_access.roles` and drop the top-level `roles`.
    pub fn with_realm_roles(self, roles: &[&str]) -> Self {
        self.without_claim("roles")
            .with_claim("realm_access", json!({ "roles": roles }))
    }

    pub fn issued_at(self, iat: i64) -> Self {
        self.with_claim("iat", json!(iat))
    }

    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Compact token with these claims and a placeholder signature.
    pub fn unsigned_token(self) -> String {
        let header = json!({"alg": "RS256", "typ": "JWT", "kid": "test"});
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(Value::Object(self.claims).to_string()),
            URL_SAFE_NO_PAD.encode(b"not-verified-by-the-backend"),
        )
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
