//! Deterministic RSA fixtures for testing
//!
//! Keys are generated from a seeded RNG, so the same seed always yields the
//! same keypair. Generation is slow enough to matter, so each seed is
//! generated once per test process and shared.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Modulus size of generated test keys.
pub const TEST_KEY_BITS: usize = 2048;

/// A 2048-bit RSA keypair with a key id, as an identity provider would hold.
pub struct TestRsaKey {
    kid: String,
    private_key: RsaPrivateKey,
    private_key_pem: String,
}

impl TestRsaKey {
    fn generate(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let mut rng = StdRng::seed_from_u64(u64::from(seed));
        let private_key = RsaPrivateKey::new(&mut rng, TEST_KEY_BITS)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate RSA key: {e}")))?;
        let private_key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| FixtureError::Crypto(format!("Failed to encode private key: {e}")))?
            .to_string();

        Ok(Self {
            kid: kid.to_string(),
            private_key,
            private_key_pem,
        })
    }

    /// Key id published in the JWKS and set in token headers.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Unsigned big-endian modulus.
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.private_key.n().to_bytes_be()
    }

    /// Unsigned big-endian public exponent.
    pub fn exponent_bytes(&self) -> Vec<u8> {
        self.private_key.e().to_bytes_be()
    }

    /// Base64url (no padding) modulus, as in a JWK `n`.
    pub fn n_b64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.modulus_bytes())
    }

    /// Base64url (no padding) exponent, as in a JWK `e`.
    pub fn e_b64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.exponent_bytes())
    }

    /// SubjectPublicKeyInfo PEM, computed independently of the code under test.
    pub fn public_key_pem(&self) -> String {
        self.private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("public key PEM encoding")
    }

    /// RS256 signing key for `jsonwebtoken`.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes()).expect("PKCS#8 PEM accepted")
    }

    /// JWK entry for a signing key (`use: sig`, `alg: RS256`).
    pub fn signing_jwk(&self) -> serde_json::Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n_b64url(),
            "e": self.e_b64url(),
        })
    }

    /// JWK entry for an encryption key, which must never be selected.
    pub fn encryption_jwk(&self) -> serde_json::Value {
        json!({
            "kid": format!("{}-enc", self.kid),
            "kty": "RSA",
            "alg": "RSA-OAEP",
            "use": "enc",
            "n": self.n_b64url(),
            "e": self.e_b64url(),
        })
    }
}

fn cache() -> &'static Mutex<HashMap<u8, Arc<TestRsaKey>>> {
    static KEYS: OnceLock<Mutex<HashMap<u8, Arc<TestRsaKey>>>> = OnceLock::new();
    KEYS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Deterministic RSA test key for `seed`, with `kid` = `"K{seed}"`.
///
/// # Example
/// ```rust,ignore
/// let key = test_rsa_key(1);
/// assert_eq!(key.kid(), "K1");
/// let jwks = json!({"keys": [key.signing_jwk()]});
/// ```
pub fn test_rsa_key(seed: u8) -> Arc<TestRsaKey> {
    let mut keys = cache().lock().expect("key cache poisoned");
    Arc::clone(keys.entry(seed).or_insert_with(|| {
        Arc::new(
            TestRsaKey::generate(seed, &format!("K{seed}")).expect("RSA test key generation"),
        )
    }))
}

/// Key set document holding the given JWK entries, in order.
pub fn jwks(keys: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "keys": keys })
}
