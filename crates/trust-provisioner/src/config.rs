//! Trust provisioner configuration.
//!
//! Configuration is loaded from environment variables. The gateway admin
//! token is held as a secret and redacted in Debug output.

use crate::models::{JoinKey, ServiceDescriptor};
use crate::retry::RetryPolicy;
use common::secret::SecretString;
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default identity provider issuer (realm URL).
pub const DEFAULT_IDP_ISSUER_URL: &str = "http://localhost:8080/realms/demo-realm";

/// Path of the key-set endpoint relative to the issuer.
pub const JWKS_PATH_SUFFIX: &str = "/protocol/openid-connect/certs";

/// Default gateway administrative API.
pub const DEFAULT_GATEWAY_ADMIN_URL: &str = "http://localhost:8001";

/// Default upstream the gateway forwards to.
pub const DEFAULT_BACKEND_UPSTREAM_URL: &str = "http://backend:3000";

/// Default gateway service object name.
pub const DEFAULT_SERVICE_NAME: &str = "backend-service";

/// Default gateway consumer representing the identity provider.
pub const DEFAULT_CONSUMER_NAME: &str = "identity-provider";

/// Default attempts for both polls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Upper bound on attempts for either poll.
pub const MAX_ATTEMPTS_LIMIT: u32 = 300;

/// Default sleep between poll attempts.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 2000;

/// Upper bound on the retry interval.
pub const MAX_RETRY_INTERVAL_MS: u64 = 60_000;

/// Default per-request timeout for outbound HTTP.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound on the per-request timeout.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 120;

/// Trust provisioner configuration.
#[derive(Clone)]
pub struct Config {
    /// Issuer URL of the identity provider realm. Also the credential key
    /// when the join key is `iss`.
    pub idp_issuer_url: String,

    /// Key-set (JWKS) endpoint.
    pub idp_jwks_url: String,

    /// Gateway administrative API base URL.
    pub gateway_admin_url: Url,

    /// Optional token sent as `Kong-Admin-Token`.
    pub gateway_admin_token: Option<SecretString>,

    /// Service object created on the gateway.
    pub service: ServiceDescriptor,

    /// Consumer that owns the verification credential.
    pub consumer_name: String,

    pub join_key: JoinKey,

    pub discovery_retry: RetryPolicy,

    pub gateway_ready_retry: RetryPolicy,

    /// Timeout applied to every outbound request.
    pub http_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("idp_issuer_url", &self.idp_issuer_url)
            .field("idp_jwks_url", &self.idp_jwks_url)
            .field("gateway_admin_url", &self.gateway_admin_url.as_str())
            .field(
                "gateway_admin_token",
                &self.gateway_admin_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("service", &self.service)
            .field("consumer_name", &self.consumer_name)
            .field("join_key", &self.join_key)
            .field("discovery_retry", &self.discovery_retry)
            .field("gateway_ready_retry", &self.gateway_ready_retry)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL in {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("Invalid TRUST_JOIN_KEY: {0}")]
    InvalidJoinKey(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        // Kept byte-for-byte: with the issuer join key it must equal the token's `iss`.
        let idp_issuer_url = non_empty(vars, "IDP_ISSUER_URL")
            .unwrap_or(DEFAULT_IDP_ISSUER_URL)
            .to_string();
        validate_url("IDP_ISSUER_URL", &idp_issuer_url)?;

        let idp_jwks_url = non_empty(vars, "IDP_JWKS_URL")
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}{JWKS_PATH_SUFFIX}",
                    idp_issuer_url.trim_end_matches('/')
                )
            });
        validate_url("IDP_JWKS_URL", &idp_jwks_url)?;

        let gateway_admin_url = validate_url(
            "GATEWAY_ADMIN_URL",
            non_empty(vars, "GATEWAY_ADMIN_URL").unwrap_or(DEFAULT_GATEWAY_ADMIN_URL),
        )?;

        let gateway_admin_token =
            non_empty(vars, "GATEWAY_ADMIN_TOKEN").map(|t| SecretString::from(t.to_string()));

        let upstream_url = non_empty(vars, "BACKEND_UPSTREAM_URL")
            .unwrap_or(DEFAULT_BACKEND_UPSTREAM_URL)
            .to_string();
        validate_url("BACKEND_UPSTREAM_URL", &upstream_url)?;

        let service = ServiceDescriptor {
            name: non_empty(vars, "GATEWAY_SERVICE_NAME")
                .unwrap_or(DEFAULT_SERVICE_NAME)
                .to_string(),
            upstream_url,
        };

        let consumer_name = non_empty(vars, "GATEWAY_CONSUMER_NAME")
            .unwrap_or(DEFAULT_CONSUMER_NAME)
            .to_string();

        let join_key = match non_empty(vars, "TRUST_JOIN_KEY") {
            Some(value) => value.parse().map_err(ConfigError::InvalidJoinKey)?,
            None => JoinKey::default(),
        };

        let retry_interval = Duration::from_millis(parse_bounded(
            vars,
            "RETRY_INTERVAL_MS",
            DEFAULT_RETRY_INTERVAL_MS,
            1,
            MAX_RETRY_INTERVAL_MS,
        )?);

        let discovery_attempts = parse_bounded(
            vars,
            "DISCOVERY_MAX_ATTEMPTS",
            u64::from(DEFAULT_MAX_ATTEMPTS),
            1,
            u64::from(MAX_ATTEMPTS_LIMIT),
        )?;

        let gateway_ready_attempts = parse_bounded(
            vars,
            "GATEWAY_READY_MAX_ATTEMPTS",
            u64::from(DEFAULT_MAX_ATTEMPTS),
            1,
            u64::from(MAX_ATTEMPTS_LIMIT),
        )?;

        let http_timeout = Duration::from_secs(parse_bounded(
            vars,
            "HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
            1,
            MAX_HTTP_TIMEOUT_SECONDS,
        )?);

        Ok(Config {
            idp_issuer_url,
            idp_jwks_url,
            gateway_admin_url,
            gateway_admin_token,
            service,
            consumer_name,
            join_key,
            discovery_retry: RetryPolicy::new(attempts_u32(discovery_attempts), retry_interval),
            gateway_ready_retry: RetryPolicy::new(
                attempts_u32(gateway_ready_attempts),
                retry_interval,
            ),
            http_timeout,
        })
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, var: &str) -> Option<&'a str> {
    vars.get(var).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn validate_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        var,
        reason: format!("'{value}': {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            reason: format!("scheme must be http or https, got '{other}'"),
        }),
    }
}

fn parse_bounded(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = non_empty(vars, var) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        var,
        reason: format!("must be a valid positive integer, got '{value_str}': {e}"),
    })?;

    if value < min || value > max {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }

    Ok(value)
}

fn attempts_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(MAX_ATTEMPTS_LIMIT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.idp_issuer_url, DEFAULT_IDP_ISSUER_URL);
        assert_eq!(
            config.idp_jwks_url,
            "http://localhost:8080/realms/demo-realm/protocol/openid-connect/certs"
        );
        assert_eq!(config.gateway_admin_url.as_str(), "http://localhost:8001/");
        assert!(config.gateway_admin_token.is_none());
        assert_eq!(config.service.name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.service.upstream_url, DEFAULT_BACKEND_UPSTREAM_URL);
        assert_eq!(config.consumer_name, DEFAULT_CONSUMER_NAME);
        assert_eq!(config.join_key, JoinKey::Issuer);
        assert_eq!(config.discovery_retry.max_attempts, 30);
        assert_eq!(config.gateway_ready_retry.max_attempts, 30);
        assert_eq!(config.discovery_retry.interval, Duration::from_millis(2000));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("IDP_ISSUER_URL", "https://idp.example.com/realms/prod/"),
            ("GATEWAY_ADMIN_URL", "http://kong:8001"),
            ("GATEWAY_ADMIN_TOKEN", "s3cret"),
            ("BACKEND_UPSTREAM_URL", "http://api:9000"),
            ("GATEWAY_SERVICE_NAME", "api"),
            ("GATEWAY_CONSUMER_NAME", "prod-idp"),
            ("TRUST_JOIN_KEY", "kid"),
            ("DISCOVERY_MAX_ATTEMPTS", "5"),
            ("GATEWAY_READY_MAX_ATTEMPTS", "300"),
            ("RETRY_INTERVAL_MS", "250"),
            ("HTTP_TIMEOUT_SECONDS", "3"),
        ]))
        .expect("Config should load successfully");

        assert_eq!(config.idp_issuer_url, "https://idp.example.com/realms/prod/");
        assert_eq!(
            config.idp_jwks_url,
            "https://idp.example.com/realms/prod/protocol/openid-connect/certs"
        );
        assert_eq!(config.gateway_admin_url.as_str(), "http://kong:8001/");
        assert_eq!(
            config.gateway_admin_token.as_ref().unwrap().expose_secret(),
            "s3cret"
        );
        assert_eq!(config.service.name, "api");
        assert_eq!(config.service.upstream_url, "http://api:9000");
        assert_eq!(config.consumer_name, "prod-idp");
        assert_eq!(config.join_key, JoinKey::KeyId);
        assert_eq!(config.discovery_retry.max_attempts, 5);
        assert_eq!(config.gateway_ready_retry.max_attempts, 300);
        assert_eq!(config.gateway_ready_retry.interval, Duration::from_millis(250));
        assert_eq!(config.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_issuer_with_trailing_slash_is_kept_as_owner_identity() {
        let config = Config::from_vars(&vars(&[(
            "IDP_ISSUER_URL",
            "https://tenant.example.com/",
        )]))
        .unwrap();

        assert_eq!(config.idp_issuer_url, "https://tenant.example.com/");
        assert_eq!(
            config
                .join_key
                .owner_identity(&config.idp_issuer_url, "K1"),
            "https://tenant.example.com/"
        );
        assert_eq!(
            config.idp_jwks_url,
            "https://tenant.example.com/protocol/openid-connect/certs"
        );
    }

    #[test]
    fn test_explicit_jwks_url_wins() {
        let config = Config::from_vars(&vars(&[(
            "IDP_JWKS_URL",
            "http://keycloak:8080/custom/certs",
        )]))
        .unwrap();

        assert_eq!(config.idp_jwks_url, "http://keycloak:8080/custom/certs");
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_vars(&vars(&[
            ("GATEWAY_ADMIN_TOKEN", "  "),
            ("TRUST_JOIN_KEY", ""),
        ]))
        .unwrap();

        assert!(config.gateway_admin_token.is_none());
        assert_eq!(config.join_key, JoinKey::Issuer);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let result = Config::from_vars(&vars(&[("DISCOVERY_MAX_ATTEMPTS", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { var: "DISCOVERY_MAX_ATTEMPTS", reason }) if reason.contains("between 1 and 300")
        ));
    }

    #[test]
    fn test_rejects_oversized_attempts() {
        let result = Config::from_vars(&vars(&[("GATEWAY_READY_MAX_ATTEMPTS", "301")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { var: "GATEWAY_READY_MAX_ATTEMPTS", .. })
        ));
    }

    #[test]
    fn test_rejects_non_numeric_interval() {
        let result = Config::from_vars(&vars(&[("RETRY_INTERVAL_MS", "2s")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { var: "RETRY_INTERVAL_MS", reason }) if reason.contains("valid positive integer")
        ));
    }

    #[test]
    fn test_rejects_negative_timeout() {
        let result = Config::from_vars(&vars(&[("HTTP_TIMEOUT_SECONDS", "-1")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { var: "HTTP_TIMEOUT_SECONDS", .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_interval() {
        let result = Config::from_vars(&vars(&[("RETRY_INTERVAL_MS", "60001")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_rejects_unknown_join_key() {
        let result = Config::from_vars(&vars(&[("TRUST_JOIN_KEY", "sub")]));
        assert!(matches!(result, Err(ConfigError::InvalidJoinKey(msg)) if msg.contains("'sub'")));
    }

    #[test]
    fn test_rejects_malformed_admin_url() {
        let result = Config::from_vars(&vars(&[("GATEWAY_ADMIN_URL", "not a url")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidUrl { var: "GATEWAY_ADMIN_URL", .. })
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let result = Config::from_vars(&vars(&[("IDP_JWKS_URL", "file:///etc/jwks.json")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidUrl { var: "IDP_JWKS_URL", reason }) if reason.contains("scheme")
        ));
    }

    #[test]
    fn test_debug_redacts_admin_token() {
        let config =
            Config::from_vars(&vars(&[("GATEWAY_ADMIN_TOKEN", "super-secret-token")])).unwrap();
        let debug = format!("{config:?}");

        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("identity-provider"));
    }
}
