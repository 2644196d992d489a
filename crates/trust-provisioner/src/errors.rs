//! Trust provisioner error types.
//!
//! Every provisioning failure is fatal to the run. Admin API failures carry
//! the step that failed plus the gateway's status and body, which is what an
//! operator needs to decide whether re-running will help.

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::gateway::AdminCallError;
use crate::key_material::KeyMaterialError;
use std::fmt;
use thiserror::Error;

/// A single admin API step of the provisioning protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    DeleteCredential { consumer: String, key: String },
    DeleteRoute(String),
    DeleteService(String),
    DeleteConsumer(String),
    CreateService(String),
    CreateRoute(String),
    CreateConsumer(String),
    CreateCredential { consumer: String, key: String },
    EnforceRoute(String),
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::DeleteCredential { consumer, key } => {
                write!(f, "delete credential '{key}' of consumer '{consumer}'")
            }
            ProvisionStep::DeleteRoute(name) => write!(f, "delete route '{name}'"),
            ProvisionStep::DeleteService(name) => write!(f, "delete service '{name}'"),
            ProvisionStep::DeleteConsumer(name) => write!(f, "delete consumer '{name}'"),
            ProvisionStep::CreateService(name) => write!(f, "create service '{name}'"),
            ProvisionStep::CreateRoute(name) => write!(f, "create route '{name}'"),
            ProvisionStep::CreateConsumer(name) => write!(f, "create consumer '{name}'"),
            ProvisionStep::CreateCredential { consumer, key } => {
                write!(f, "create credential '{key}' for consumer '{consumer}'")
            }
            ProvisionStep::EnforceRoute(name) => {
                write!(f, "enable signature verification on route '{name}'")
            }
        }
    }
}

/// Top-level provisioning error.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("gateway admin API not ready after {attempts} attempts: {last_error}")]
    GatewayNotReady {
        attempts: u32,
        last_error: AdminCallError,
    },

    #[error("signing key discovery failed: {0}")]
    Discovery(DiscoveryError),

    #[error("key material conversion failed: {0}")]
    Conversion(#[from] KeyMaterialError),

    #[error("step '{step}' failed with HTTP {status}: {body}")]
    AdminApi {
        step: ProvisionStep,
        status: u16,
        body: String,
    },

    #[error("step '{step}' failed: {message}")]
    AdminTransport { step: ProvisionStep, message: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl ProvisionError {
    /// Attach step context to a failed admin call.
    pub fn admin(step: ProvisionStep, error: AdminCallError) -> Self {
        match error {
            AdminCallError::Status { status, body } => ProvisionError::AdminApi { step, status, body },
            AdminCallError::Transport(message) => ProvisionError::AdminTransport { step, message },
        }
    }

    /// Name of the phase or admin step that failed, for the exit log line.
    pub fn failed_step(&self) -> String {
        match self {
            ProvisionError::Config(_) => "load configuration".to_string(),
            ProvisionError::HttpClient(_) => "build HTTP client".to_string(),
            ProvisionError::GatewayNotReady { .. } => "wait for gateway".to_string(),
            ProvisionError::Discovery(_) => "discover signing key".to_string(),
            ProvisionError::Conversion(_) => "convert key material".to_string(),
            ProvisionError::AdminApi { step, .. } | ProvisionError::AdminTransport { step, .. } => {
                step.to_string()
            }
        }
    }

    /// Admin API response body, when the failure came from the gateway.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            ProvisionError::AdminApi { body, .. } => Some(body),
            ProvisionError::GatewayNotReady {
                last_error: AdminCallError::Status { body, .. },
                ..
            } => Some(body),
            _ => None,
        }
    }
}

/// Bad key material on the selected key is a conversion failure, not a
/// discovery one.
impl From<DiscoveryError> for ProvisionError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidKeyMaterial { source, .. } => ProvisionError::Conversion(source),
            other => ProvisionError::Discovery(other),
        }
    }
}
