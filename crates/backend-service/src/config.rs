//! Backend service configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use crate::auth::RolesClaim;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default size of the Postgres pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Upper bound on the Postgres pool size.
pub const MAX_DB_MAX_CONNECTIONS: u32 = 100;

/// Default shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// Upper bound on the drain period.
pub const MAX_DRAIN_SECONDS: u64 = 300;

/// Backend service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Claim holding the caller's roles (default: `roles`).
    pub roles_claim: RolesClaim,

    pub db_max_connections: u32,

    /// How long to keep serving in-flight requests after SIGTERM/SIGINT.
    pub drain_period: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("roles_claim", &self.roles_claim.to_string())
            .field("db_max_connections", &self.db_max_connections)
            .field("drain_period", &self.drain_period)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid ROLES_CLAIM: {0}")]
    InvalidRolesClaim(String),

    #[error("Invalid {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let roles_claim = match vars.get("ROLES_CLAIM") {
            Some(path) => path.parse().map_err(ConfigError::InvalidRolesClaim)?,
            None => RolesClaim::default(),
        };

        let db_max_connections = parse_bounded(
            vars,
            "DB_MAX_CONNECTIONS",
            u64::from(DEFAULT_DB_MAX_CONNECTIONS),
            1,
            u64::from(MAX_DB_MAX_CONNECTIONS),
        )
        .map(|v| u32::try_from(v).unwrap_or(MAX_DB_MAX_CONNECTIONS))?;

        let drain_period = Duration::from_secs(parse_bounded(
            vars,
            "BACKEND_DRAIN_SECONDS",
            DEFAULT_DRAIN_SECONDS,
            0,
            MAX_DRAIN_SECONDS,
        )?);

        Ok(Config {
            database_url,
            bind_address,
            roles_claim,
            db_max_connections,
            drain_period,
        })
    }
}

fn parse_bounded(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(var) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        var,
        reason: format!("must be a valid non-negative integer, got '{value_str}': {e}"),
    })?;

    if !(min..=max).contains(&value) {
        return Err(ConfigError::InvalidValue {
            var,
            reason: format!("must be between {min} and {max}, got {value}"),
        });
    }

    Ok(value)
}
