//! Key Material Converter.
//!
//! Turns the `(n, e)` pair an identity provider publishes in its JWKS into the
//! PEM-armored `SubjectPublicKeyInfo` the gateway accepts as an RSA
//! verification credential.
//!
//! The conversion is pure and deterministic: the same `(n, e)` always yields
//! byte-identical PEM text, including the 64-column line wrapping, so two
//! provisioning runs against an unrotated provider register the same key.

use common::jwt::decode_base64url;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{BigUint, RsaPublicKey};
use std::fmt;
use thiserror::Error;

/// Smallest accepted RSA modulus, in bits.
pub const MIN_MODULUS_BITS: usize = 2048;

/// Largest accepted RSA modulus, in bits.
pub const MAX_MODULUS_BITS: usize = 4096;

/// Largest public exponent the gateway's verifier accepts (2^33 - 1).
const MAX_PUBLIC_EXPONENT: u64 = (1 << 33) - 1;

/// Errors converting JWK key material into a canonical public key.
///
/// Every variant is fatal to a provisioning run: a key that fails here must
/// never be registered with the gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyMaterialError {
    /// `n` or `e` is not valid base64url.
    #[error("invalid base64url in '{component}': {reason}")]
    InvalidEncoding {
        component: &'static str,
        reason: String,
    },

    /// The modulus is not an RSA modulus of a supported size.
    #[error("unsupported modulus: {0}")]
    UnsupportedModulus(String),

    /// The exponent is zero, even, too small or too large.
    #[error("invalid public exponent: {0}")]
    InvalidExponent(String),

    /// The DER/PEM encoder rejected the key.
    #[error("failed to encode public key: {0}")]
    Encoding(String),
}

/// PEM-armored `SubjectPublicKeyInfo` for an RSA public key.
///
/// Derived on every provisioning run and never stored. The text always starts
/// with `-----BEGIN PUBLIC KEY-----`, wraps the base64 body at 64 columns and
/// ends with `-----END PUBLIC KEY-----` followed by a newline.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalPublicKey {
    pem: String,
}

impl CanonicalPublicKey {
    /// The PEM text.
    pub fn as_pem(&self) -> &str {
        &self.pem
    }
}

impl fmt::Debug for CanonicalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalPublicKey")
            .field("pem_len", &self.pem.len())
            .finish()
    }
}

impl fmt::Display for CanonicalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pem)
    }
}

/// Decode one base64url JWK component (`n` or `e`) into big-endian bytes.
///
/// # Errors
///
/// Returns `KeyMaterialError::InvalidEncoding` naming the component. This
/// includes inputs whose length mod 4 is 1, which are never truncated.
pub fn decode_component(component: &'static str, value: &str) -> Result<Vec<u8>, KeyMaterialError> {
    decode_base64url(value).map_err(|e| KeyMaterialError::InvalidEncoding {
        component,
        reason: e.to_string(),
    })
}

/// Convert base64url `(n, e)` text, as found in a JWK, into PEM.
///
/// # Errors
///
/// See [`rsa_public_key_pem`] and [`decode_component`].
pub fn jwk_components_to_pem(
    n_b64url: &str,
    e_b64url: &str,
) -> Result<CanonicalPublicKey, KeyMaterialError> {
    let modulus = decode_component("n", n_b64url)?;
    let exponent = decode_component("e", e_b64url)?;
    rsa_public_key_pem(&modulus, &exponent)
}

/// Convert an unsigned big-endian `(modulus, exponent)` pair into PEM.
///
/// Leading zero bytes are ignored (some providers prefix `n` with `0x00` as if
/// it were a signed DER integer).
///
/// # Errors
///
/// - `UnsupportedModulus` unless the modulus is odd and 2048-4096 bits
/// - `InvalidExponent` unless the exponent is odd and in `3..=2^33-1`
/// - `Encoding` if the SPKI encoder fails
pub fn rsa_public_key_pem(
    modulus: &[u8],
    exponent: &[u8],
) -> Result<CanonicalPublicKey, KeyMaterialError> {
    let modulus = strip_leading_zeros(modulus);
    check_modulus(modulus)?;

    let exponent = strip_leading_zeros(exponent);
    check_exponent(exponent)?;

    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from_bytes_be(exponent),
    )
    .map_err(|e| KeyMaterialError::Encoding(e.to_string()))?;

    let pem = key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyMaterialError::Encoding(e.to_string()))?;

    tracing::debug!(
        target: "provisioner.key_material",
        modulus_bits = bit_length(modulus),
        "Converted JWK key material to SubjectPublicKeyInfo PEM"
    );

    Ok(CanonicalPublicKey { pem })
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(first_nonzero..).unwrap_or_default()
}

fn bit_length(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(first) => bytes.len() * 8 - first.leading_zeros() as usize,
        None => 0,
    }
}

fn check_modulus(modulus: &[u8]) -> Result<(), KeyMaterialError> {
    let bits = bit_length(modulus);

    if bits == 0 {
        return Err(KeyMaterialError::UnsupportedModulus(
            "modulus is zero".to_string(),
        ));
    }

    if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
        return Err(KeyMaterialError::UnsupportedModulus(format!(
            "{bits}-bit modulus is outside the supported {MIN_MODULUS_BITS}-{MAX_MODULUS_BITS} bit range"
        )));
    }

    if modulus.last().is_some_and(|b| b & 1 == 0) {
        return Err(KeyMaterialError::UnsupportedModulus(
            "modulus is even and cannot be an RSA modulus".to_string(),
        ));
    }

    Ok(())
}

fn check_exponent(exponent: &[u8]) -> Result<(), KeyMaterialError> {
    if exponent.is_empty() {
        return Err(KeyMaterialError::InvalidExponent(
            "exponent is zero".to_string(),
        ));
    }

    if exponent.len() > 8 {
        return Err(KeyMaterialError::InvalidExponent(format!(
            "{}-byte exponent exceeds the maximum of {MAX_PUBLIC_EXPONENT}",
            exponent.len()
        )));
    }

    let value = exponent
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    if value < 3 {
        return Err(KeyMaterialError::InvalidExponent(format!(
            "exponent {value} is below the minimum of 3"
        )));
    }

    if value > MAX_PUBLIC_EXPONENT {
        return Err(KeyMaterialError::InvalidExponent(format!(
            "exponent {value} exceeds the maximum of {MAX_PUBLIC_EXPONENT}"
        )));
    }

    if value % 2 == 0 {
        return Err(KeyMaterialError::InvalidExponent(format!(
            "exponent {value} is even"
        )));
    }

    Ok(())
}
