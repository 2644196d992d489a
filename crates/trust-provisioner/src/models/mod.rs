//! Provisioning data model.
//!
//! Plain values shared by the registrar, the enforcement configurator and the
//! run orchestration. Nothing here talks to the network.

use crate::key_material::CanonicalPublicKey;
use std::fmt;
use std::str::FromStr;

/// Signature algorithms the gateway is asked to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    Rs256,
}

impl SigningAlgorithm {
    /// Every supported algorithm, in preference order.
    pub const SUPPORTED: &'static [SigningAlgorithm] = &[SigningAlgorithm::Rs256];

    /// JOSE `alg` value, which is also the gateway's algorithm name.
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::Rs256 => "RS256",
        }
    }

    /// Parse a JOSE `alg` value. Returns `None` for unsupported algorithms.
    pub fn from_jose(alg: &str) -> Option<Self> {
        Self::SUPPORTED.iter().copied().find(|a| a.as_str() == alg)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which token field the gateway uses to find the verification credential.
///
/// Chosen once per deployment. The credential's `owner_identity` and the
/// enforcement rule's key-claim name are both derived from this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKey {
    /// Join on the `iss` claim; the credential is keyed by the issuer URL.
    #[default]
    Issuer,

    /// Join on `kid`; the credential is keyed by the signing key id.
    KeyId,
}

impl JoinKey {
    /// Claim (or header field) name the gateway reads to look up the credential.
    pub fn claim_name(self) -> &'static str {
        match self {
            JoinKey::Issuer => "iss",
            JoinKey::KeyId => "kid",
        }
    }

    /// Stable credential key for this deployment.
    pub fn owner_identity(self, issuer_url: &str, key_id: &str) -> String {
        match self {
            JoinKey::Issuer => issuer_url.to_string(),
            JoinKey::KeyId => key_id.to_string(),
        }
    }
}

impl FromStr for JoinKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iss" => Ok(JoinKey::Issuer),
            "kid" => Ok(JoinKey::KeyId),
            other => Err(format!("expected 'iss' or 'kid', got '{other}'")),
        }
    }
}

/// The upstream the gateway proxies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub upstream_url: String,
}

/// A gateway route. Routing and enforcement are configured independently:
/// every route is created by the registrar, and only the ones with
/// `requires_signature_check` get a verification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub name: String,
    pub path_prefix: String,
    pub requires_signature_check: bool,
}

impl RouteDescriptor {
    /// Route proxied without any signature check.
    pub fn public(name: &str, path_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            requires_signature_check: false,
        }
    }

    /// Route on which the gateway must verify the bearer token.
    pub fn protected(name: &str, path_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            requires_signature_check: true,
        }
    }
}

/// Routes in front of the backend service.
pub fn default_routes() -> Vec<RouteDescriptor> {
    vec![
        RouteDescriptor::public("public-route", "/public"),
        RouteDescriptor::protected("profile-route", "/profile"),
        RouteDescriptor::protected("user-route", "/user"),
        RouteDescriptor::protected("admin-route", "/admin"),
    ]
}

/// A verification credential registered on the gateway consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBinding {
    pub owner_identity: String,
    pub key: CanonicalPublicKey,
    pub algorithm: SigningAlgorithm,
}
