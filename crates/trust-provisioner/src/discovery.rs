//! Discovery Client for the identity provider's signing keys.
//!
//! Fetches the JSON Web Key Set from the provider's certs endpoint and picks
//! the key the gateway should trust. Fetching is polled (the provider is
//! usually still booting when provisioning starts); selection is not, since a
//! parsed key set without a usable key will not fix itself.
//!
//! # Selection
//!
//! A key is a candidate when `use == "sig"`, `kty == "RSA"`, it carries a
//! `kid`, and its `alg` is supported. Keys without `use` are skipped: Keycloak
//! publishes an `enc` RSA-OAEP key next to the signing key and some providers
//! omit `use` entirely, so guessing is unsafe. When several candidates
//! remain (key rotation) the first in provider order wins.

use crate::key_material::{
    decode_component, rsa_public_key_pem, CanonicalPublicKey, KeyMaterialError,
};
use crate::models::SigningAlgorithm;
use crate::retry::{poll, PollError, RetryPolicy, Transient};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

/// Errors fetching or selecting a signing key.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("key set request failed: {0}")]
    Transport(String),

    #[error("key set endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("key set response could not be parsed: {0}")]
    InvalidBody(String),

    #[error("no RSA signing key with a supported algorithm among {key_count} published keys")]
    NoSigningKey { key_count: usize },

    #[error("key set unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        attempts: u32,
        last_error: Box<DiscoveryError>,
    },

    #[error("signing key '{kid}' has invalid key material: {source}")]
    InvalidKeyMaterial {
        kid: String,
        source: KeyMaterialError,
    },
}

impl Transient for DiscoveryError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Transport(_)
                | DiscoveryError::Status { .. }
                | DiscoveryError::InvalidBody(_)
        )
    }
}

/// JSON Web Key as published by the identity provider.
///
/// Only the fields needed for selection and RSA conversion are read; the
/// certificate chain and thumbprints Keycloak adds are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub kty: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Declared purpose of a published key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    Signing,
    Encryption,
}

impl KeyUsage {
    pub fn from_jwk_use(value: &str) -> Option<Self> {
        match value {
            "sig" => Some(KeyUsage::Signing),
            "enc" => Some(KeyUsage::Encryption),
            _ => None,
        }
    }
}

/// The provider key selected for trust registration.
///
/// `modulus` and `exponent` are unsigned big-endian bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyDescriptor {
    pub key_id: String,
    pub algorithm: SigningAlgorithm,
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
    pub usage: KeyUsage,
}

impl SigningKeyDescriptor {
    /// Decode a candidate JWK's `n` and `e`.
    fn from_candidate(candidate: Candidate<'_>) -> Result<Self, DiscoveryError> {
        let invalid = |source: KeyMaterialError| DiscoveryError::InvalidKeyMaterial {
            kid: candidate.kid.to_string(),
            source,
        };

        let modulus = decode_component("n", candidate.jwk.n.as_deref().unwrap_or_default())
            .map_err(&invalid)?;
        let exponent = decode_component("e", candidate.jwk.e.as_deref().unwrap_or_default())
            .map_err(&invalid)?;

        Ok(Self {
            key_id: candidate.kid.to_string(),
            algorithm: candidate.algorithm,
            modulus,
            exponent,
            usage: KeyUsage::Signing,
        })
    }

    /// Convert to the canonical PEM encoding registered with the gateway.
    ///
    /// # Errors
    ///
    /// Propagates `KeyMaterialError` when the modulus or exponent is not an
    /// acceptable RSA public key.
    pub fn to_public_key(&self) -> Result<CanonicalPublicKey, KeyMaterialError> {
        rsa_public_key_pem(&self.modulus, &self.exponent)
    }
}

#[derive(Clone, Copy)]
struct Candidate<'a> {
    kid: &'a str,
    algorithm: SigningAlgorithm,
    jwk: &'a Jwk,
}

fn as_candidate(jwk: &Jwk) -> Option<Candidate<'_>> {
    let usage = jwk.key_use.as_deref().and_then(KeyUsage::from_jwk_use)?;
    if usage != KeyUsage::Signing || jwk.kty.as_deref() != Some("RSA") {
        return None;
    }

    let algorithm = jwk.alg.as_deref().and_then(SigningAlgorithm::from_jose)?;
    let kid = jwk.kid.as_deref().filter(|k| !k.is_empty())?;

    Some(Candidate {
        kid,
        algorithm,
        jwk,
    })
}

/// Select the signing key from a parsed key set.
///
/// Deterministic: the first candidate in provider order. Several candidates
/// are logged at warn level with every candidate key id.
///
/// # Errors
///
/// - `NoSigningKey` if nothing qualifies
/// - `InvalidKeyMaterial` if the selected key's `n` or `e` is not base64url
pub fn select_signing_key(key_set: &JwksResponse) -> Result<SigningKeyDescriptor, DiscoveryError> {
    let candidates: Vec<Candidate<'_>> = key_set.keys.iter().filter_map(as_candidate).collect();

    let Some(selected) = candidates.first().copied() else {
        tracing::error!(
            target: "provisioner.discovery",
            key_count = key_set.keys.len(),
            "No usable signing key in key set"
        );
        return Err(DiscoveryError::NoSigningKey {
            key_count: key_set.keys.len(),
        });
    };

    if candidates.len() > 1 {
        let kids: Vec<&str> = candidates.iter().map(|c| c.kid).collect();
        tracing::warn!(
            target: "provisioner.discovery",
            candidates = ?kids,
            selected = %selected.kid,
            "Multiple signing keys published, selecting the first"
        );
    }

    SigningKeyDescriptor::from_candidate(selected)
}

/// Client for the identity provider's key-set endpoint.
pub struct DiscoveryClient {
    http_client: reqwest::Client,
    retry: RetryPolicy,
}

impl DiscoveryClient {
    /// `http_client` should carry a request timeout; see
    /// [`crate::http::build_http_client`].
    pub fn new(http_client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { http_client, retry }
    }

    /// Fetch and select the active signing key, polling until the key set is
    /// available or the retry policy is exhausted.
    ///
    /// # Errors
    ///
    /// - `Unavailable` wrapping the last transport/status/body error
    /// - `NoSigningKey` or `InvalidKeyMaterial` from selection (not retried)
    #[instrument(skip_all, name = "provisioner.discovery.fetch_signing_key", fields(url = %discovery_url))]
    pub async fn fetch_signing_key(
        &self,
        discovery_url: &str,
    ) -> Result<SigningKeyDescriptor, DiscoveryError> {
        let key_set = poll(self.retry, "fetch key set", || {
            self.fetch_key_set(discovery_url)
        })
        .await
        .map_err(|e| match e {
            PollError::Exhausted {
                attempts,
                last_error,
            } => DiscoveryError::Unavailable {
                attempts,
                last_error: Box::new(last_error),
            },
            PollError::Permanent(e) => e,
        })?;

        let descriptor = select_signing_key(&key_set)?;

        tracing::info!(
            target: "provisioner.discovery",
            kid = %descriptor.key_id,
            alg = %descriptor.algorithm,
            "Selected signing key"
        );

        Ok(descriptor)
    }

    /// Single GET of the key set.
    async fn fetch_key_set(&self, discovery_url: &str) -> Result<JwksResponse, DiscoveryError> {
        let response = self
            .http_client
            .get(discovery_url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
            });
        }

        let key_set: JwksResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::InvalidBody(e.to_string()))?;

        tracing::debug!(
            target: "provisioner.discovery",
            key_count = key_set.keys.len(),
            "Fetched key set"
        );

        Ok(key_set)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> JwksResponse {
        serde_json::from_value(value).unwrap()
    }

    fn rsa_sig(kid: &str) -> serde_json::Value {
        json!({"kid": kid, "kty": "RSA", "alg": "RS256", "use": "sig", "n": "AQAB", "e": "AQAB"})
    }

    #[test]
    fn test_jwk_deserialization_ignores_unknown_fields() {
        let key_set = parse(json!({"keys": [{
            "kid": "K1",
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": "AQAB",
            "e": "AQAB",
            "x5c": ["MIIC..."],
            "x5t": "abc",
            "x5t#S256": "def"
        }]}));

        assert_eq!(key_set.keys.len(), 1);
        assert_eq!(key_set.keys.first().unwrap().key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_selects_only_signing_key() {
        let key_set = parse(json!({"keys": [
            {"kid": "enc-1", "kty": "RSA", "alg": "RSA-OAEP", "use": "enc", "n": "AQAB", "e": "AQAB"},
            rsa_sig("K1"),
        ]}));

        let selected = select_signing_key(&key_set).unwrap();

        assert_eq!(selected.key_id, "K1");
        assert_eq!(selected.algorithm, SigningAlgorithm::Rs256);
        assert_eq!(selected.usage, KeyUsage::Signing);
        assert_eq!(selected.modulus, vec![0x01, 0x00, 0x01]);
        assert_eq!(selected.exponent, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_first_of_several_candidates_wins() {
        let key_set = parse(json!({"keys": [rsa_sig("K2"), rsa_sig("K1"), rsa_sig("K3")]}));

        let selected = select_signing_key(&key_set).unwrap();
        assert_eq!(selected.key_id, "K2");
    }

    #[test]
    fn test_key_without_use_is_not_a_candidate() {
        let key_set = parse(json!({"keys": [
            {"kid": "K0", "kty": "RSA", "alg": "RS256", "n": "AQAB", "e": "AQAB"},
        ]}));

        let result = select_signing_key(&key_set);
        assert!(matches!(result, Err(DiscoveryError::NoSigningKey { key_count: 1 })));
    }

    #[test]
    fn test_unsupported_algorithm_and_key_type_skipped() {
        let key_set = parse(json!({"keys": [
            {"kid": "ec", "kty": "EC", "alg": "ES256", "use": "sig", "crv": "P-256", "x": "a", "y": "b"},
            {"kid": "okp", "kty": "OKP", "alg": "EdDSA", "use": "sig", "crv": "Ed25519", "x": "a"},
            {"kid": "ps", "kty": "RSA", "alg": "PS256", "use": "sig", "n": "AQAB", "e": "AQAB"},
            {"kid": "mismatch", "kty": "EC", "alg": "RS256", "use": "sig"},
        ]}));

        let result = select_signing_key(&key_set);
        assert!(matches!(result, Err(DiscoveryError::NoSigningKey { key_count: 4 })));
    }

    #[test]
    fn test_empty_key_set() {
        let result = select_signing_key(&parse(json!({"keys": []})));
        assert!(matches!(result, Err(DiscoveryError::NoSigningKey { key_count: 0 })));
    }

    #[test]
    fn test_malformed_modulus_on_selected_key() {
        let key_set = parse(json!({"keys": [
            {"kid": "K1", "kty": "RSA", "alg": "RS256", "use": "sig", "n": "AQABC", "e": "AQAB"},
        ]}));

        let result = select_signing_key(&key_set);
        assert!(matches!(
            result,
            Err(DiscoveryError::InvalidKeyMaterial {
                kid,
                source: KeyMaterialError::InvalidEncoding { component: "n", .. }
            }) if kid == "K1"
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DiscoveryError::Transport("refused".into()).is_transient());
        assert!(DiscoveryError::Status { status: 503 }.is_transient());
        assert!(DiscoveryError::InvalidBody("eof".into()).is_transient());
        assert!(!DiscoveryError::NoSigningKey { key_count: 2 }.is_transient());
    }
}
