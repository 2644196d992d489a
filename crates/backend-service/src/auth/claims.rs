//! Claims forwarded by the gateway.
//!
//! The gateway verifies the bearer token's signature and expiry before the
//! request reaches the backend. What remains here is shape: the subject, an
//! optional issued-at, and the role set read from one configured claim.
//! `sub` is redacted in Debug output to keep identifiers out of logs.

use common::jwt::{decode_payload_unverified, JwtSegmentError};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Claim that holds the role array unless configured otherwise.
pub const DEFAULT_ROLES_CLAIM: &str = "roles";

/// Why forwarded claims could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("{0}")]
    Segment(#[from] JwtSegmentError),

    #[error("missing 'sub' claim")]
    MissingSubject,

    #[error("'iat' must be an integer timestamp")]
    InvalidIssuedAt,

    #[error("missing '{0}' claim")]
    MissingRoles(String),

    #[error("'{0}' claim must be an array of strings")]
    InvalidRoles(String),
}

/// Dotted path to the role array, e.g. `roles` or `realm_access.roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolesClaim {
    segments: Vec<String>,
}

impl RolesClaim {
    /// Follow the path through nested objects.
    pub fn lookup<'a>(&self, claims: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        rest.iter()
            .try_fold(claims.get(first)?, |value, segment| value.get(segment))
    }
}

impl Default for RolesClaim {
    fn default() -> Self {
        Self {
            segments: vec![DEFAULT_ROLES_CLAIM.to_string()],
        }
    }
}

impl FromStr for RolesClaim {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim();
        if path.is_empty() {
            return Err("roles claim path must not be empty".to_string());
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(format!("roles claim path '{path}' has an empty segment"));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for RolesClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Identity and roles of the caller, as asserted by the forwarded token.
#[derive(Clone)]
pub struct AuthenticatedClaims {
    /// Subject - redacted in Debug output.
    pub subject: String,

    pub roles: BTreeSet<String>,

    /// Issued-at (Unix epoch seconds), when the token carries one.
    pub issued_at: Option<i64>,

    /// Full payload.
    pub raw: Map<String, Value>,
}

impl fmt::Debug for AuthenticatedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClaims")
            .field("subject", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClaims {
    /// Case-sensitive exact membership.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// `preferred_username` when present, otherwise the subject.
    pub fn display_name(&self) -> &str {
        self.raw
            .get("preferred_username")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.subject)
    }
}

/// Read claims from a token WITHOUT verifying its signature.
///
/// Callers must only pass tokens that the gateway has already verified on
/// this request path. The payload segment is decoded and shape-checked;
/// header and signature segments are ignored beyond framing.
///
/// # Errors
///
/// Any [`ClaimsError`]. A missing roles claim is reported separately from a
/// present but malformed one; an empty array is a valid, empty role set.
pub fn trust_upstream_claims(
    token: &str,
    roles_claim: &RolesClaim,
) -> Result<AuthenticatedClaims, ClaimsError> {
    let raw = decode_payload_unverified(token)?;

    let subject = raw
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .ok_or(ClaimsError::MissingSubject)?
        .to_string();

    let issued_at = match raw.get("iat") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_i64().ok_or(ClaimsError::InvalidIssuedAt)?),
    };

    let roles = parse_roles(&raw, roles_claim)?;

    Ok(AuthenticatedClaims {
        subject,
        roles,
        issued_at,
        raw,
    })
}

fn parse_roles(
    claims: &Map<String, Value>,
    roles_claim: &RolesClaim,
) -> Result<BTreeSet<String>, ClaimsError> {
    let value = roles_claim
        .lookup(claims)
        .ok_or_else(|| ClaimsError::MissingRoles(roles_claim.to_string()))?;

    let invalid = || ClaimsError::InvalidRoles(roles_claim.to_string());
    value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|role| role.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}
