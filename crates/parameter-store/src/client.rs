//! # Parameter Store Client
//!
//! The entry point applications use to read their distributed configuration:
//! plans the lookup paths for a resolution context, fetches and merges them,
//! and hands back prioritized property sources.

use crate::assembler::{PriorityRules, PropertySource};
use crate::error::{ConfigurationFetchError, FetchErrorKind};
use crate::gateway::ParameterGateway;
use crate::naming::{ProfileSuffixNaming, SourceNamingPolicy};
use crate::orchestrator::FetchOrchestrator;
use crate::planner::PathPlan;
use common::config::{ClientConfig, ParameterStoreConfig, DEFAULT_SOURCE_TAG};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Human readable name of this configuration source
pub const DESCRIPTION: &str = "Remote Parameter Store";

/// Environment snapshot for one resolution call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    application_name: Option<String>,
    active_profiles: Vec<String>,
    service_id: Option<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context described by the loaded client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            application_name: config.application.name.clone(),
            active_profiles: config.application.active_profiles.clone(),
            service_id: config.discovery.service_id.clone(),
        }
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Profiles are looked up in the order given
    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn active_profiles(&self) -> &[String] {
        &self.active_profiles
    }

    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }
}

/// A source of distributed configuration
pub trait ConfigurationClient: Send + Sync {
    /// Property sources for `context`; on failure the stream yields exactly
    /// one error and nothing else
    fn property_sources(
        &self,
        context: &ResolutionContext,
    ) -> BoxStream<'static, Result<PropertySource, ConfigurationFetchError>>;

    fn description(&self) -> &str;
}

/// Resolves property sources from a remote parameter store
#[derive(Clone)]
pub struct ParameterStoreClient {
    config: ParameterStoreConfig,
    source_tag: String,
    gateway: Arc<dyn ParameterGateway>,
    naming: Arc<dyn SourceNamingPolicy>,
    executor: Option<Handle>,
    cancellation: CancellationToken,
}

impl ParameterStoreClient {
    pub fn new(config: ParameterStoreConfig, gateway: impl ParameterGateway + 'static) -> Self {
        info!(
            root = %config.root_hierarchy_path,
            enabled = config.enabled,
            "Initializing parameter store client"
        );

        Self {
            config,
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            gateway: Arc::new(gateway),
            naming: Arc::new(ProfileSuffixNaming),
            executor: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Client using the store and discovery sections of a loaded configuration
    pub fn from_client_config(config: &ClientConfig, gateway: impl ParameterGateway + 'static) -> Self {
        Self::new(config.parameter_store.clone(), gateway)
            .with_source_tag(config.discovery.source_tag.clone())
    }

    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = source_tag.into();
        self
    }

    pub fn with_naming_policy(mut self, naming: impl SourceNamingPolicy + 'static) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Run resolutions on `executor` instead of the calling task
    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Abort resolutions once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &ParameterStoreConfig {
        &self.config
    }

    /// Resolve every property source for `context`
    ///
    /// Returns no sources, without contacting the store, when the client is
    /// disabled. Any failure fails the whole call.
    pub async fn resolve(
        &self,
        context: &ResolutionContext,
    ) -> Result<Vec<PropertySource>, ConfigurationFetchError> {
        if !self.config.enabled {
            debug!("Parameter store disabled, skipping distributed configuration");
            return Ok(Vec::new());
        }

        // Dropping this call, even while a spawned task runs it, stops the fetches.
        let call_token = self.cancellation.child_token();
        let _cancel_on_drop = call_token.clone().drop_guard();

        let orchestrator = FetchOrchestrator::new(
            self.gateway.clone(),
            self.naming.clone(),
            self.config.use_secure_parameters,
        )
        .with_cancellation(call_token);

        let resolution = resolve_sources(
            orchestrator,
            self.config.clone(),
            self.source_tag.clone(),
            context.clone(),
        );

        let result = match &self.executor {
            Some(executor) => executor.spawn(resolution).await.unwrap_or_else(|error| {
                if error.is_cancelled() {
                    Err(ConfigurationFetchError::cancelled())
                } else {
                    Err(ConfigurationFetchError::new(FetchErrorKind::Unexpected, error))
                }
            }),
            None => resolution.await,
        };

        if let Err(error) = &result {
            warn!(error = %error, "Failed to resolve distributed configuration");
        }

        result
    }
}

impl ConfigurationClient for ParameterStoreClient {
    fn property_sources(
        &self,
        context: &ResolutionContext,
    ) -> BoxStream<'static, Result<PropertySource, ConfigurationFetchError>> {
        let client = self.clone();
        let context = context.clone();

        stream::once(async move { client.resolve(&context).await })
            .map_ok(|sources| {
                stream::iter(sources.into_iter().map(Ok::<_, ConfigurationFetchError>))
            })
            .try_flatten()
            .boxed()
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }
}

async fn resolve_sources(
    orchestrator: FetchOrchestrator,
    config: ParameterStoreConfig,
    source_tag: String,
    context: ResolutionContext,
) -> Result<Vec<PropertySource>, ConfigurationFetchError> {
    let plan = PathPlan::new(
        &config.root_hierarchy_path,
        context.active_profiles(),
        context.service_id(),
    );

    let assembler = orchestrator
        .resolve(&plan, context.active_profiles())
        .await?;

    let rules = PriorityRules::new(
        config.base_priority,
        context.service_id().map(str::to_string),
    );
    let sources = assembler.finish(&rules, &source_tag);

    for source in &sources {
        debug!(
            source = %source.name(),
            priority = source.priority(),
            keys = source.values().len(),
            "Resolved property source"
        );
    }

    info!(
        application = context.application_name().unwrap_or("unknown"),
        sources = sources.len(),
        "Resolved distributed configuration"
    );

    Ok(sources)
}
