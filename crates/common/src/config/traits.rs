//! # Configuration Traits
//!
//! Core traits for configuration validation.

use crate::error::ClientError;

/// Common configuration validation trait
///
/// Implemented by every configuration section so that a loaded configuration
/// can be checked before the client issues its first remote lookup.
pub trait ConfigValidation {
    type Error: ClientError;

    /// Validate the configuration, failing on the first hard error
    fn validate(&self) -> Result<(), Self::Error>;

    /// Non-fatal findings worth surfacing in logs
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}
