//! Identity provider client fixture: password-grant tokens and key discovery.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Public client the demo realm exposes for the password grant.
pub const DEFAULT_CLIENT_ID: &str = "demo-client";

/// Identity provider client errors.
#[derive(Debug, Error)]
pub enum IdpClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Token issuance failed with status {status}: {body}")]
    IssuanceFailed { status: u16, body: String },

    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),
}

/// Resource-owner password grant, sent form-encoded.
#[derive(Clone, Serialize)]
pub struct PasswordGrant {
    grant_type: &'static str,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl PasswordGrant {
    pub fn new(
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            grant_type: "password",
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for PasswordGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordGrant")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Token endpoint response. Only `access_token` is required.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// JWKS (JSON Web Key Set) response.
#[derive(Debug, Deserialize, Clone)]
pub struct JwksResponse {
    pub keys: Vec<JwkKey>,
}

/// A single JWK as the identity provider publishes it.
#[derive(Debug, Deserialize, Clone)]
pub struct JwkKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

impl JwkKey {
    /// RS256 signing key, the only kind the gateway is provisioned with.
    pub fn is_rs256_signing(&self) -> bool {
        self.kty == "RSA"
            && self.alg.as_deref() == Some("RS256")
            && self.key_use.as_deref() == Some("sig")
    }
}

/// Seeded demo-realm accounts.
///
/// Defaults match the demo realm import; each value can be overridden with
/// the matching `ENV_TEST_*` variable.
#[derive(Clone)]
pub struct TestAccounts {
    pub client_id: String,
    /// Holds realm role `user` only.
    pub user: (String, String),
    /// Holds realm roles `user` and `admin`.
    pub admin: (String, String),
}

impl TestAccounts {
    pub fn from_env() -> Self {
        let var = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        Self {
            client_id: var("ENV_TEST_CLIENT_ID", DEFAULT_CLIENT_ID),
            user: (
                var("ENV_TEST_USER", "testuser"),
                var("ENV_TEST_USER_PASSWORD", "password"),
            ),
            admin: (
                var("ENV_TEST_ADMIN", "adminuser"),
                var("ENV_TEST_ADMIN_PASSWORD", "password"),
            ),
        }
    }

    pub fn user_grant(&self) -> PasswordGrant {
        PasswordGrant::new(&self.client_id, &self.user.0, &self.user.1)
    }

    pub fn admin_grant(&self) -> PasswordGrant {
        PasswordGrant::new(&self.client_id, &self.admin.0, &self.admin.1)
    }
}

/// Client for one realm of the identity provider.
pub struct IdpClient {
    realm_url: String,
    http_client: Client,
}

impl IdpClient {
    /// `realm_url` is the issuer, e.g. `http://localhost:8080/realms/demo-realm`.
    pub fn new(realm_url: impl Into<String>) -> Self {
        Self {
            realm_url: realm_url.into(),
            http_client: Client::new(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url)
    }

    /// Issue an access token with the password grant.
    pub async fn password_grant(
        &self,
        grant: &PasswordGrant,
    ) -> Result<TokenResponse, IdpClientError> {
        let response = self
            .http_client
            .post(self.token_url())
            .form(grant)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IdpClientError::IssuanceFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    /// Fetch the realm's published key set.
    pub async fn fetch_jwks(&self) -> Result<JwksResponse, IdpClientError> {
        let jwks_url = format!("{}/protocol/openid-connect/certs", self.realm_url);

        let response = self.http_client.get(&jwks_url).send().await?;

        if !response.status().is_success() {
            return Err(IdpClientError::JwksFetchFailed(format!(
                "Status: {}",
                response.status()
            )));
        }

        Ok(response.json::<JwksResponse>().await?)
    }

    pub fn realm_url(&self) -> &str {
        &self.realm_url
    }
}
