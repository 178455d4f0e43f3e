//! # Parameter Store Error Types
//!
//! Errors raised while resolving distributed configuration: gateway failures
//! with retry categorization, decoding failures, and the single
//! `ConfigurationFetchError` surfaced to callers.

use crate::parameter::ParameterType;
use common::error::ClientError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a `ParameterGateway` implementation
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection to parameter store failed: {message}")]
    ConnectionError { message: String },

    #[error("Parameter store request timed out after {timeout:?}: {message}")]
    Timeout { message: String, timeout: Duration },

    #[error("Parameter store throttled the request: {message}")]
    Throttled { message: String },

    #[error("Parameter store unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Credentials expired: {message}")]
    ExpiredCredentials { message: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Invalid parameter store request: {message}")]
    InvalidRequest { message: String },

    #[error("Maximum retry attempts exceeded: {attempts} attempts failed, last error: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError for GatewayError {}

/// How a gateway failure should be treated by `RetryExecutor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Timeouts and unavailable endpoints
    Transient,
    /// The store throttled the caller
    RateLimit,
    /// Expired credentials, which a refresh may fix
    Auth,
    /// The request itself is wrong
    Config,
    /// The store could not be reached
    Network,
    /// Retrying cannot help
    Permanent,
}

/// Backoff schedule applied by `RetryExecutor`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first failed call
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay between half and all of its nominal value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Schedule for errors of `category`, `None` when they are not retried
    pub fn for_category(category: ErrorCategory) -> Option<Self> {
        let config = match category {
            ErrorCategory::Transient => Self::default(),
            ErrorCategory::RateLimit => Self {
                max_attempts: 6,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(20),
                ..Self::default()
            },
            ErrorCategory::Network => Self {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                backoff_multiplier: 3.0,
                ..Self::default()
            },
            // one retry, giving a credential provider time to refresh
            ErrorCategory::Auth => Self {
                max_attempts: 1,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 1.0,
                jitter: false,
            },
            ErrorCategory::Config | ErrorCategory::Permanent => return None,
        };
        Some(config)
    }
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Timeout { .. } | GatewayError::ServiceUnavailable { .. } => {
                ErrorCategory::Transient
            }
            GatewayError::ConnectionError { .. } => ErrorCategory::Network,
            GatewayError::Throttled { .. } => ErrorCategory::RateLimit,
            GatewayError::ExpiredCredentials { .. } => ErrorCategory::Auth,
            GatewayError::InvalidRequest { .. } => ErrorCategory::Config,
            GatewayError::AccessDenied { .. }
            | GatewayError::MaxRetriesExceeded { .. }
            | GatewayError::Other(_) => ErrorCategory::Permanent,
        }
    }

    /// Default backoff for this error, `None` when it is not retried
    pub fn retry_config(&self) -> Option<RetryConfig> {
        RetryConfig::for_category(self.category())
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_config().is_some()
    }

    pub fn max_retries_exceeded(attempts: u32, last_error: &GatewayError) -> Self {
        GatewayError::MaxRetriesExceeded {
            attempts,
            last_error: last_error.to_string(),
        }
    }
}

/// A parameter value that does not have the `key=value` shape its type requires
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parameter {name} of type {parameter_type} is malformed: item {item_index} is not a key=value pair")]
pub struct MalformedParameterError {
    /// Full key path of the offending parameter
    pub name: String,
    /// Declared type of the parameter
    pub parameter_type: ParameterType,
    /// Zero-based index of the offending item (always 0 for single-valued types)
    pub item_index: usize,
}

impl ClientError for MalformedParameterError {}

/// What went wrong in a failed resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The gateway failed to talk to the store
    Transport,
    /// A fetched parameter could not be decoded
    MalformedParameter,
    /// The resolution was cancelled before it completed
    Cancelled,
    /// Anything the gateway could not classify
    Unexpected,
}

/// The single error surfaced by a resolution call
///
/// Carries the original cause, reachable through `std::error::Error::source`.
#[derive(Error, Debug)]
#[error("Error reading distributed configuration from the remote parameter store: {message}")]
pub struct ConfigurationFetchError {
    kind: FetchErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ClientError for ConfigurationFetchError {}

impl ConfigurationFetchError {
    /// Wrap a cause, keeping it as the error source
    pub fn new(
        kind: FetchErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Error for a resolution cancelled before completion
    pub fn cancelled() -> Self {
        Self {
            kind: FetchErrorKind::Cancelled,
            message: "resolution was cancelled".to_string(),
            source: None,
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failures collected inside the pipeline before they reach the caller
#[derive(Debug)]
pub(crate) enum ResolveFailure {
    /// Already in the caller-facing shape; passed through untouched
    Configuration(ConfigurationFetchError),
    Gateway(GatewayError),
    Malformed(MalformedParameterError),
}

impl ResolveFailure {
    /// Rewrap into the caller-facing error, never wrapping twice
    pub(crate) fn into_configuration_error(self) -> ConfigurationFetchError {
        match self {
            ResolveFailure::Configuration(error) => error,
            ResolveFailure::Gateway(error @ GatewayError::Other(_)) => {
                ConfigurationFetchError::new(FetchErrorKind::Unexpected, error)
            }
            ResolveFailure::Gateway(error) => {
                ConfigurationFetchError::new(FetchErrorKind::Transport, error)
            }
            ResolveFailure::Malformed(error) => {
                ConfigurationFetchError::new(FetchErrorKind::MalformedParameter, error)
            }
        }
    }
}

impl From<ConfigurationFetchError> for ResolveFailure {
    fn from(error: ConfigurationFetchError) -> Self {
        ResolveFailure::Configuration(error)
    }
}

impl From<GatewayError> for ResolveFailure {
    fn from(error: GatewayError) -> Self {
        ResolveFailure::Gateway(error)
    }
}

impl From<MalformedParameterError> for ResolveFailure {
    fn from(error: MalformedParameterError) -> Self {
        ResolveFailure::Malformed(error)
    }
}

impl From<ResolveFailure> for ConfigurationFetchError {
    fn from(failure: ResolveFailure) -> Self {
        failure.into_configuration_error()
    }
}
