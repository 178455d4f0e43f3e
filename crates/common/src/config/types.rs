//! # Configuration Types
//!
//! Configuration structures for the parameter store client: where the remote
//! hierarchy lives, how the service identifies itself, and which profiles are
//! active for the running application.

use serde::{Deserialize, Serialize};

use crate::config::traits::ConfigValidation;
use crate::error::ConfigurationError;

/// Default root of the remote parameter hierarchy
pub const DEFAULT_ROOT_HIERARCHY_PATH: &str = "/config/";

/// Default tag prepended to every emitted property source name
pub const DEFAULT_SOURCE_TAG: &str = "route53";

/// Position of environment-variable sources in the consuming framework's
/// precedence scale; remote sources are ranked just above it.
pub const ENVIRONMENT_SOURCE_PRIORITY: i32 = -300;

/// Remote parameter store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParameterStoreConfig {
    /// Whether distributed configuration is looked up at all
    pub enabled: bool,

    /// Root of the hierarchy, e.g. `/config/`
    pub root_hierarchy_path: String,

    /// Ask the store to decrypt `SecureString` parameters
    pub use_secure_parameters: bool,

    /// Priority the emitted sources are ranked relative to
    pub base_priority: i32,
}

impl Default for ParameterStoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root_hierarchy_path: DEFAULT_ROOT_HIERARCHY_PATH.to_string(),
            use_secure_parameters: false,
            base_priority: ENVIRONMENT_SOURCE_PRIORITY,
        }
    }
}

/// Service discovery identity used for application-specific lookups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Service identity; enables the application-specific path when set
    pub service_id: Option<String>,

    /// Tag prefixed to emitted source names (`<tag>-<name>`)
    pub source_tag: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_id: None,
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
        }
    }
}

/// Identity and active profiles of the running application
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: Option<String>,

    /// Active profiles, in the order they are looked up
    pub active_profiles: Vec<String>,
}

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub application: ApplicationConfig,
    pub parameter_store: ParameterStoreConfig,
    pub discovery: DiscoveryConfig,
}

impl ConfigValidation for ParameterStoreConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        let path = &self.root_hierarchy_path;

        if !path.is_empty() && !path.starts_with('/') {
            return Err(ConfigurationError::invalid_value(
                "root_hierarchy_path",
                path.clone(),
                "Root hierarchy path must start with '/'",
            ));
        }

        if path.contains("//") {
            return Err(ConfigurationError::invalid_value(
                "root_hierarchy_path",
                path.clone(),
                "Root hierarchy path cannot contain empty segments",
            ));
        }

        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            warnings.push("Parameter store lookups are disabled".to_string());
        }

        if self.root_hierarchy_path.is_empty() {
            warnings.push("Root hierarchy path is empty, parameters are read from '/'".to_string());
        }

        warnings
    }
}

impl ConfigValidation for DiscoveryConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.source_tag.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "source_tag",
                self.source_tag.clone(),
                "Source tag cannot be empty",
            ));
        }

        if let Some(service_id) = &self.service_id {
            if service_id.is_empty() || service_id.contains('/') {
                return Err(ConfigurationError::invalid_value(
                    "service_id",
                    service_id.clone(),
                    "Service id must be a single non-empty path segment",
                ));
            }
        }

        Ok(())
    }
}

impl ConfigValidation for ApplicationConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        for profile in &self.active_profiles {
            if profile.is_empty() || profile.contains('/') {
                return Err(ConfigurationError::invalid_value(
                    "active_profiles",
                    profile.clone(),
                    "Profile names must be non-empty and cannot contain '/'",
                ));
            }
        }

        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.active_profiles
            .iter()
            .filter(|profile| !seen.insert(profile.as_str()))
            .map(|profile| format!("Profile '{profile}' is listed more than once"))
            .collect()
    }
}

impl ConfigValidation for ClientConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.application.validate()?;
        self.parameter_store.validate()?;
        self.discovery.validate()
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = self.application.warnings();
        warnings.extend(self.parameter_store.warnings());
        warnings.extend(self.discovery.warnings());
        warnings
    }
}
