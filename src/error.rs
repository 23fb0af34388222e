//! # Error Taxonomy
//!
//! Every failure that can abort a provisioning run maps onto one variant of
//! [`ProvisionError`]. The binary inspects the variant to pick an exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Bad or missing input, detected before any network call.
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// The external descriptor file could not be read or parsed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A remote call failed terminally after transport-level retries.
    #[error("{step} failed at {endpoint}: {reason}")]
    RemoteOperation {
        step: String,
        endpoint: String,
        reason: String,
    },

    /// A poll loop exhausted its attempt budget.
    #[error("{step} not ready after {attempts} attempts")]
    ReadinessTimeout { step: String, attempts: u32 },

    /// No usable access token could be loaded, refreshed or acquired.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// The fetched config artifact could not be decoded or written.
    #[error("config artifact error: {0}")]
    Artifact(String),
}

impl ProvisionError {
    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::Validation(_) => 1,
            ProvisionError::Configuration(_) => 2,
            ProvisionError::RemoteOperation { .. } => 3,
            ProvisionError::ReadinessTimeout { .. } => 4,
            ProvisionError::Credentials(_) => 5,
            ProvisionError::Artifact(_) => 6,
        }
    }

    pub(crate) fn remote(step: &str, endpoint: &str, reason: impl ToString) -> Self {
        ProvisionError::RemoteOperation {
            step: step.to_string(),
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
