//! # Configuration Loader
//!
//! Client configuration is assembled from three layers, later layers winning:
//! compiled defaults, a TOML file, then `PARAMSTORE_*` environment variables.
//! Nested keys in the environment are separated with `__`, so
//! `PARAMSTORE_PARAMETER_STORE__ENABLED=false` switches remote lookups off.

use crate::config::traits::ConfigValidation;
use crate::config::types::ClientConfig;
use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const LOCAL_CONFIG_FILE: &str = "paramstore.toml";
const SYSTEM_CONFIG_FILE: &str = "/etc/paramstore/config.toml";
const USER_CONFIG_FILE: &str = ".config/paramstore/config.toml";

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "PARAMSTORE";

/// Names the configuration file explicitly; never treated as an override
const CONFIG_PATH_KEY: &str = "CONFIG_PATH";

/// Where and how to look for configuration
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub env_prefix: String,
    /// Fail instead of falling back to defaults when the file is missing
    pub require_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
            require_file: false,
        }
    }
}

impl LoadOptions {
    /// Options reading exactly `path`, which must exist
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            require_file: true,
            ..Default::default()
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    fn env_provider(&self) -> Env {
        Env::prefixed(&format!("{}_", self.env_prefix))
            .split("__")
            .ignore(&[CONFIG_PATH_KEY])
    }
}

/// Load `T` from the discovered file and the environment
pub fn load_config<T>() -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + Serialize,
{
    load_config_with_options(LoadOptions::default())
}

/// Load `T` from `path`, with environment overrides on top
pub fn load_from_file<T>(path: &Path) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + Serialize,
{
    load_config_with_options(LoadOptions::for_file(path))
}

pub fn load_config_with_options<T>(options: LoadOptions) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + Serialize,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    match resolve_config_file(options.config_path.clone())? {
        Some(path) if path.is_file() => {
            ensure_toml(&path)?;
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(&path));
        }
        Some(path) if options.require_file => {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Some(path) => {
            warn!(path = %path.display(), "Configuration file missing, using defaults");
        }
        None => debug!("No configuration file found, using defaults"),
    }

    debug!(prefix = %options.env_prefix, "Applying environment overrides");
    figment = figment.merge(options.env_provider());

    figment
        .extract()
        .map_err(|err| ConfigurationError::ParseError {
            details: format!("Failed to parse configuration: {err}"),
        })
}

/// Load the client configuration, reject invalid values and log warnings
pub fn load_client_config(path_override: Option<PathBuf>) -> Result<ClientConfig, ConfigurationError> {
    let options = match path_override {
        Some(path) => LoadOptions::for_file(path),
        None => LoadOptions::default(),
    };

    let config: ClientConfig = load_config_with_options(options)?;
    config.validate()?;

    for warning in config.warnings() {
        warn!("{warning}");
    }

    Ok(config)
}

/// Check that `path` exists and is in a supported format
pub fn validate_config_file(path: &Path) -> Result<(), ConfigurationError> {
    if !path.is_file() {
        return Err(ConfigurationError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    ensure_toml(path)
}

/// Explicit path, then `PARAMSTORE_CONFIG_PATH`, then the first existing
/// well-known location
fn resolve_config_file(explicit: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigurationError> {
    if explicit.is_some() {
        return Ok(explicit);
    }

    if let Ok(path) = std::env::var(format!("{ENV_PREFIX}_{CONFIG_PATH_KEY}")) {
        debug!(path = %path, "Configuration path taken from environment");
        return Ok(Some(PathBuf::from(path)));
    }

    Ok(candidate_files()?.into_iter().find(|path| path.is_file()))
}

fn candidate_files() -> Result<Vec<PathBuf>, ConfigurationError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigurationError::EnvironmentError {
        var: "current_dir".to_string(),
        details: e.to_string(),
    })?;

    let mut candidates = vec![cwd.join(LOCAL_CONFIG_FILE), PathBuf::from(SYSTEM_CONFIG_FILE)];
    if let Some(home) = home_dir() {
        candidates.push(home.join(USER_CONFIG_FILE));
    }

    Ok(candidates)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn ensure_toml(path: &Path) -> Result<(), ConfigurationError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(()),
        other => Err(ConfigurationError::ParseError {
            details: format!(
                "Unsupported configuration format '{}' for {}, expected toml",
                other.unwrap_or_default(),
                path.display()
            ),
        }),
    }
}
