//! Builder for identity-provider style access tokens
//!
//! Produces the claims an IdP such as Keycloak would put in an access token
//! and signs them RS256 with a [`TestRsaKey`](crate::crypto_fixtures::TestRsaKey).

use crate::crypto_fixtures::TestRsaKey;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Map, Value};

/// Builder for signed test access tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .issued_by("http://localhost:8080/realms/demo-realm")
///     .for_user("bob")
///     .with_roles(&["admin"])
///     .sign(&test_rsa_key(1));
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid_header: bool,
}

impl TestTokenBuilder {
    /// Defaults: `sub = "test-subject"`, no roles, `exp` one hour out, `iat` now.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("exp".to_string(), json!((now + Duration::seconds(3600)).timestamp()));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        Self {
            claims,
            kid_header: true,
        }
    }

    /// Set `iss`.
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set `sub` and `preferred_username`.
    pub fn for_user(self, username: &str) -> Self {
        self.with_claim("sub", json!(username))
            .with_claim("preferred_username", json!(username))
    }

    /// Set a top-level `roles` array.
    pub fn with_roles(self, roles: &[&str]) -> Self {
        self.with_claim("roles", json!(roles))
    }

    /// Set Keycloak's `realm_access.roles`.
    pub fn with_realm_roles(self, roles: &[&str]) -> Self {
        self.with_claim("realm_access", json!({ "roles": roles }))
    }

    /// Set expiration in seconds from now (negative for an expired token).
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set or replace any claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Leave `kid` out of the JOSE header.
    pub fn without_kid_header(mut self) -> Self {
        self.kid_header = false;
        self
    }

    /// Claims as a JSON value.
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }

    /// Sign RS256 with `key`; the header carries `key.kid()` unless disabled.
    pub fn sign(self, key: &TestRsaKey) -> String {
        let mut header = Header::new(Algorithm::RS256);
        if self.kid_header {
            header.kid = Some(key.kid().to_string());
        }
        encode(&header, &Value::Object(self.claims), &key.encoding_key()).expect("RS256 signing")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::test_rsa_key;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    #[test]
    fn test_builder_creates_claims() {
        let claims = TestTokenBuilder::new()
            .issued_by("http://idp/realms/test")
            .for_user("alice")
            .with_roles(&["user"])
            .build();

        assert_eq!(claims["iss"], "http://idp/realms/test");
        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["preferred_username"], "alice");
        assert_eq!(claims["roles"], json!(["user"]));
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_signed_token_verifies_with_public_key() {
        let key = test_rsa_key(1);
        let token = TestTokenBuilder::new().for_user("bob").sign(&key);

        let decoding_key = DecodingKey::from_rsa_pem(key.public_key_pem().as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        let data = decode::<Value>(&token, &decoding_key, &validation).unwrap();

        assert_eq!(data.header.kid.as_deref(), Some("K1"));
        assert_eq!(data.claims["sub"], "bob");
    }

    #[test]
    fn test_without_claim() {
        let claims = TestTokenBuilder::new().without_claim("iat").build();
        assert!(claims.get("iat").is_none());
    }
}
