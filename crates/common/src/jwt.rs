//! JWT segment utilities shared by the provisioner and the backend.
//!
//! This module provides:
//! - Size limits for DoS prevention
//! - base64url decoding with padding restoration (JWK `n`/`e`, JWT segments)
//! - Splitting a compact JWT into its three segments
//! - Decoding a segment into a JSON object WITHOUT signature verification
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE splitting or decoding
//! - Nothing in this module verifies a signature. Callers that decode a payload
//!   here must either verify the token elsewhere or sit behind a component
//!   that already has (see `backend_service::auth::trust_upstream_claims`).

use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical provider-issued access tokens are 1-2KB. Anything larger than this
/// is rejected before base64 decoding allocates a buffer for it.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while taking a compact JWT or a base64url value apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtSegmentError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token is not `header.payload.signature`.
    #[error("token is not a three-segment compact JWT")]
    MalformedToken,

    /// A base64url value could not be decoded.
    #[error("invalid base64url: {0}")]
    InvalidBase64Url(String),

    /// A decoded segment is not a JSON object.
    #[error("segment is not a JSON object: {0}")]
    InvalidJson(String),
}

// =============================================================================
// Types
// =============================================================================

/// The three segments of a compact JWT, still base64url encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSegments<'a> {
    /// JOSE header segment.
    pub header: &'a str,
    /// Claims segment.
    pub payload: &'a str,
    /// Signature segment.
    pub signature: &'a str,
}

// =============================================================================
// Functions
// =============================================================================

/// Restore `=` padding on base64url text that was published without it.
///
/// Padding already present is trimmed first, then re-added from the length:
///
/// | `len % 4` | action |
/// |---|---|
/// | 0 | none |
/// | 2 | append `==` |
/// | 3 | append `=` |
/// | 1 | invalid, no number of padding chars makes this decodable |
///
/// # Errors
///
/// Returns `JwtSegmentError::InvalidBase64Url` when `len % 4 == 1`.
pub fn restore_base64url_padding(input: &str) -> Result<String, JwtSegmentError> {
    let trimmed = input.trim_end_matches('=');

    let padding = match trimmed.len() % 4 {
        0 => "",
        2 => "==",
        3 => "=",
        _ => {
            tracing::debug!(
                target: "common.jwt",
                length = trimmed.len(),
                "Rejected base64url input with length mod 4 == 1"
            );
            return Err(JwtSegmentError::InvalidBase64Url(format!(
                "encoded length {} is not valid base64 (length mod 4 == 1)",
                trimmed.len()
            )));
        }
    };

    let mut padded = String::with_capacity(trimmed.len() + padding.len());
    padded.push_str(trimmed);
    padded.push_str(padding);
    Ok(padded)
}

/// Decode base64url text, with or without padding, into bytes.
///
/// The input is never truncated to make it decode: a length that cannot be a
/// base64 encoding is an error, as is any character outside the URL-safe
/// alphabet.
///
/// # Errors
///
/// Returns `JwtSegmentError::InvalidBase64Url` on bad length or bad alphabet.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, JwtSegmentError> {
    let padded = restore_base64url_padding(input)?;

    URL_SAFE.decode(padded.as_bytes()).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode base64url value");
        JwtSegmentError::InvalidBase64Url(e.to_string())
    })
}

/// Split a compact JWT into its three segments.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` if there are not exactly three non-empty header/payload segments
pub fn split_token(token: &str) -> Result<TokenSegments<'_>, JwtSegmentError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtSegmentError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtSegmentError::MalformedToken);
    };

    if header.is_empty() || payload.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty header or payload segment");
        return Err(JwtSegmentError::MalformedToken);
    }

    Ok(TokenSegments {
        header,
        payload,
        signature,
    })
}

/// Decode one base64url segment into a JSON object.
///
/// # Errors
///
/// - `InvalidBase64Url` if the segment does not decode
/// - `InvalidJson` if the bytes are not a JSON object
pub fn decode_json_segment(segment: &str) -> Result<Map<String, Value>, JwtSegmentError> {
    let bytes = decode_base64url(segment)?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(JwtSegmentError::InvalidJson(format!(
            "expected object, found {}",
            json_kind(&other)
        ))),
        Err(e) => {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
            Err(JwtSegmentError::InvalidJson(e.to_string()))
        }
    }
}

/// Decode the payload (claims) of a compact JWT without verifying anything.
///
/// The signature segment is not inspected. The result is only as trustworthy
/// as whatever verified the token before it got here.
///
/// # Errors
///
/// Any [`JwtSegmentError`] from [`split_token`] or [`decode_json_segment`].
pub fn decode_payload_unverified(token: &str) -> Result<Map<String, Value>, JwtSegmentError> {
    let segments = split_token(token)?;
    decode_json_segment(segments.payload)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================
