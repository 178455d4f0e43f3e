//! # Parameter Gateways
//!
//! The seam between the resolution pipeline and the remote store, plus an
//! in-process store for local development and tests.

use crate::error::GatewayError;
use crate::parameter::{ParameterType, RawParameter, PATH_SEPARATOR};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Network access to a hierarchical parameter store
///
/// Implementations own authentication, transport and any retry policy.
#[async_trait]
pub trait ParameterGateway: Send + Sync {
    /// Parameters whose names exactly match `names`; unknown names are omitted
    async fn fetch_flat(
        &self,
        names: &[String],
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError>;

    /// Parameters below `path`, one level deep or, when `recursive`, all levels
    async fn fetch_hierarchy(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError>;
}

#[async_trait]
impl<G: ParameterGateway + ?Sized> ParameterGateway for Arc<G> {
    async fn fetch_flat(
        &self,
        names: &[String],
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        (**self).fetch_flat(names, decrypt).await
    }

    async fn fetch_hierarchy(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        (**self).fetch_hierarchy(path, recursive, decrypt).await
    }
}

/// Parameter store held in process memory
///
/// `SecureString` values are only returned in plaintext when decryption is
/// requested; otherwise the caller receives an opaque encoding, as a remote
/// store would hand back ciphertext.
#[derive(Clone, Default)]
pub struct InMemoryParameterStore {
    parameters: Arc<RwLock<BTreeMap<String, RawParameter>>>,
    requests: Arc<AtomicUsize>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from parameters, later duplicates replacing earlier ones
    pub fn with_parameters(parameters: impl IntoIterator<Item = RawParameter>) -> Self {
        let map = parameters
            .into_iter()
            .map(|parameter| (parameter.name.clone(), parameter))
            .collect();
        Self {
            parameters: Arc::new(RwLock::new(map)),
            requests: Arc::default(),
        }
    }

    /// Load parameters from a JSON array of `{name, value, type}` records
    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read parameter fixture {}", path.display()))?;
        let parameters: Vec<RawParameter> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse parameter fixture {}", path.display()))?;

        debug!("Loaded {} parameters from {:?}", parameters.len(), path);
        Ok(Self::with_parameters(parameters))
    }

    pub async fn put(&self, parameter: RawParameter) {
        self.parameters
            .write()
            .await
            .insert(parameter.name.clone(), parameter);
    }

    pub async fn remove(&self, name: &str) -> bool {
        self.parameters.write().await.remove(name).is_some()
    }

    pub async fn len(&self) -> usize {
        self.parameters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.parameters.read().await.is_empty()
    }

    /// Number of fetches served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn reveal(parameter: &RawParameter, decrypt: bool) -> RawParameter {
        let mut parameter = parameter.clone();
        if parameter.parameter_type == ParameterType::SecureString && !decrypt {
            parameter.value = parameter.value.map(hex::encode);
        }
        parameter
    }
}

#[async_trait]
impl ParameterGateway for InMemoryParameterStore {
    async fn fetch_flat(
        &self,
        names: &[String],
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let parameters = self.parameters.read().await;

        Ok(names
            .iter()
            .filter_map(|name| parameters.get(name))
            .map(|parameter| Self::reveal(parameter, decrypt))
            .collect())
    }

    async fn fetch_hierarchy(
        &self,
        path: &str,
        recursive: bool,
        decrypt: bool,
    ) -> Result<Vec<RawParameter>, GatewayError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let prefix = if path.ends_with(PATH_SEPARATOR) {
            path.to_string()
        } else {
            format!("{path}{PATH_SEPARATOR}")
        };

        let parameters = self.parameters.read().await;
        Ok(parameters
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .filter(|(name, _)| {
                let remainder = &name[prefix.len()..];
                !remainder.is_empty()
                    && (recursive
                        || !remainder
                            .trim_end_matches(PATH_SEPARATOR)
                            .contains(PATH_SEPARATOR))
            })
            .map(|(_, parameter)| Self::reveal(parameter, decrypt))
            .collect())
    }
}
