//! Error handling shared across the workspace
//!
//! Library errors use thiserror; anyhow is reserved for causes we do not
//! classify.

use thiserror::Error;

/// Implemented by every error the client crates raise
///
/// Such errors are `Send + Sync + 'static`, so they can leave a spawned
/// resolution task and be boxed as a cause.
pub trait ClientError: std::error::Error + Send + Sync + 'static {}

/// Failure to load or validate the local client configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file {path} does not exist")]
    FileNotFound { path: String },

    #[error("Malformed client configuration: {details}")]
    ParseError { details: String },

    /// A loaded setting violates its rules
    #[error("Setting {key} = '{value}' is invalid: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Cannot inspect {var}: {details}")]
    EnvironmentError { var: String, details: String },
}

impl ClientError for ConfigurationError {}

impl ConfigurationError {
    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
