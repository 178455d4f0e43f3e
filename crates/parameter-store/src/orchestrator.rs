//! # Fetch Orchestration
//!
//! Drives a `PathPlan` through a gateway in two phases. Phase one collects
//! every fetch result: the flat fetches of all planned paths, then the
//! hierarchy fetches of every matched key. Both batches run concurrently and
//! keep their input order. Phase two decodes and merges synchronously in
//! planned order, so completion order never changes the outcome.

use crate::assembler::PropertySourceAssembler;
use crate::error::{ConfigurationFetchError, ResolveFailure};
use crate::gateway::ParameterGateway;
use crate::naming::SourceNamingPolicy;
use crate::parameter::{decode_all, decode_parameter, RawParameter};
use crate::planner::{with_leading_separator, LookupPath, PathPlan};
use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A flat-fetched parameter accepted as a property-source root
#[derive(Debug)]
struct MatchedKey {
    parameter: RawParameter,
    lookup_key: String,
    source_names: BTreeSet<String>,
}

/// Everything phase one fetched, in merge order
#[derive(Debug)]
struct FetchedKey {
    matched: MatchedKey,
    children: Vec<RawParameter>,
}

/// Fetches and merges the parameters of a path plan
#[derive(Clone)]
pub struct FetchOrchestrator {
    gateway: Arc<dyn ParameterGateway>,
    naming: Arc<dyn SourceNamingPolicy>,
    decrypt: bool,
    cancellation: CancellationToken,
}

impl FetchOrchestrator {
    pub fn new(
        gateway: Arc<dyn ParameterGateway>,
        naming: Arc<dyn SourceNamingPolicy>,
        decrypt: bool,
    ) -> Self {
        Self {
            gateway,
            naming,
            decrypt,
            cancellation: CancellationToken::new(),
        }
    }

    /// Stop issuing fetches and discard results once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Fetch every planned path and merge the decoded entries
    ///
    /// Any failure aborts the whole resolution; nothing fetched before the
    /// failure is kept.
    pub async fn resolve(
        &self,
        plan: &PathPlan,
        active_profiles: &[String],
    ) -> Result<PropertySourceAssembler, ConfigurationFetchError> {
        let fetched = self.collect(plan, active_profiles).await?;
        self.ensure_not_cancelled()?;
        Ok(Self::merge(fetched)?)
    }

    async fn collect(
        &self,
        plan: &PathPlan,
        active_profiles: &[String],
    ) -> Result<Vec<FetchedKey>, ResolveFailure> {
        info!(
            paths = plan.paths().len(),
            root = %plan.root(),
            "Fetching distributed configuration"
        );

        let flat_results = self
            .guarded(try_join_all(
                plan.paths().iter().map(|path| self.fetch_flat(path)),
            ))
            .await?;

        let matched: Vec<MatchedKey> = flat_results
            .into_iter()
            .flatten()
            .filter_map(|parameter| self.match_key(plan, active_profiles, parameter))
            .collect();

        debug!(keys = matched.len(), "Fetching parameter hierarchies");

        let children = self
            .guarded(try_join_all(
                matched.iter().map(|key| self.fetch_children(&key.lookup_key)),
            ))
            .await?;

        Ok(matched
            .into_iter()
            .zip(children)
            .map(|(matched, children)| FetchedKey { matched, children })
            .collect())
    }

    /// Flat parameter first, then its hierarchy, so children win on equal keys
    fn merge(fetched: Vec<FetchedKey>) -> Result<PropertySourceAssembler, ResolveFailure> {
        let mut assembler = PropertySourceAssembler::new();

        for FetchedKey { matched, children } in fetched {
            let mut entries = decode_parameter(&matched.parameter)?;
            entries.extend(decode_all(&children)?);
            assembler.merge(&matched.source_names, &entries);
        }

        Ok(assembler)
    }

    fn match_key(
        &self,
        plan: &PathPlan,
        active_profiles: &[String],
        parameter: RawParameter,
    ) -> Option<MatchedKey> {
        if parameter.is_folder() {
            return None;
        }

        let Some(segment) = plan.name_segment(&parameter.name) else {
            debug!(key = %parameter.name, "Ignoring parameter outside the planned paths");
            return None;
        };

        let source_names = self.naming.source_names(segment, active_profiles);
        if source_names.is_empty() {
            debug!(key = %parameter.name, "No active property source for parameter");
            return None;
        }

        Some(MatchedKey {
            lookup_key: with_leading_separator(&parameter.name),
            parameter,
            source_names,
        })
    }

    async fn fetch_flat(&self, path: &LookupPath) -> Result<Vec<RawParameter>, ResolveFailure> {
        let parameters = self
            .gateway
            .fetch_flat(&[path.path().to_string()], self.decrypt)
            .await
            .map_err(|error| {
                warn!(path = %path, error = %error, "Flat parameter fetch failed");
                error
            })?;

        debug!(path = %path, parameters = parameters.len(), "Fetched parameters");
        Ok(parameters)
    }

    async fn fetch_children(&self, key: &str) -> Result<Vec<RawParameter>, ResolveFailure> {
        let children = self
            .gateway
            .fetch_hierarchy(key, true, self.decrypt)
            .await
            .map_err(|error| {
                warn!(path = %key, error = %error, "Hierarchy fetch failed");
                error
            })?;

        debug!(path = %key, parameters = children.len(), "Fetched parameter hierarchy");
        Ok(children)
    }

    /// Run `operation` unless cancelled; abandon it if cancelled meanwhile
    async fn guarded<T, F>(&self, operation: F) -> Result<T, ResolveFailure>
    where
        F: Future<Output = Result<T, ResolveFailure>>,
    {
        self.ensure_not_cancelled()?;

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                info!("Distributed configuration fetch cancelled");
                Err(ConfigurationFetchError::cancelled().into())
            }
            result = operation => result,
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), ResolveFailure> {
        if self.cancellation.is_cancelled() {
            return Err(ConfigurationFetchError::cancelled().into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::PriorityRules;
    use crate::error::{FetchErrorKind, GatewayError};
    use crate::gateway::InMemoryParameterStore;
    use crate::naming::ProfileSuffixNaming;
    use crate::parameter::ParameterType;
    use async_trait::async_trait;

    fn orchestrator(gateway: impl ParameterGateway + 'static) -> FetchOrchestrator {
        FetchOrchestrator::new(Arc::new(gateway), Arc::new(ProfileSuffixNaming), false)
    }

    fn string(name: &str, value: &str) -> RawParameter {
        RawParameter::new(name, value, ParameterType::String)
    }

    #[tokio::test]
    async fn test_children_override_flat_value() {
        let store = InMemoryParameterStore::with_parameters(vec![
            string("/config/application", "timeout=10"),
            RawParameter::folder("/config/application/"),
            string("/config/application/http", "timeout=30"),
            string("/config/application/http/retry", "attempts=3"),
        ]);

        let plan = PathPlan::new("/config/", &[], None);
        let sources = orchestrator(store)
            .resolve(&plan, &[])
            .await
            .unwrap()
            .finish(&PriorityRules::new(0, None), "route53");

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].get("timeout"), Some("30"));
        assert_eq!(sources[0].get("attempts"), Some("3"));
    }

    #[tokio::test]
    async fn test_one_hierarchy_fetch_per_matched_key() {
        let store = InMemoryParameterStore::with_parameters(vec![
            string("/config/application", "a=1"),
            string("/config/application_prod", "a=2"),
        ]);

        let profiles = vec!["prod".to_string()];
        let plan = PathPlan::new("/config/", &profiles, None);
        let assembler = orchestrator(store.clone())
            .resolve(&plan, &profiles)
            .await
            .unwrap();

        assert_eq!(assembler.len(), 2);
        // two flat fetches plus one hierarchy fetch per matched key
        assert_eq!(store.request_count(), 4);
    }

    #[tokio::test]
    async fn test_malformed_parameter_aborts_resolution() {
        let store = InMemoryParameterStore::with_parameters(vec![
            string("/config/application", "a=1"),
            string("/config/application/broken", "no-separator"),
        ]);

        let plan = PathPlan::new("/config/", &[], None);
        let error = orchestrator(store).resolve(&plan, &[]).await.unwrap_err();
        assert_eq!(error.kind(), FetchErrorKind::MalformedParameter);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_issues_no_fetch() {
        let store = InMemoryParameterStore::with_parameters(vec![string(
            "/config/application",
            "a=1",
        )]);
        let token = CancellationToken::new();
        token.cancel();

        let plan = PathPlan::new("/config/", &[], None);
        let error = orchestrator(store.clone())
            .with_cancellation(token)
            .resolve(&plan, &[])
            .await
            .unwrap_err();

        assert_eq!(error.kind(), FetchErrorKind::Cancelled);
        assert_eq!(store.request_count(), 0);
    }

    struct StalledGateway;

    #[async_trait]
    impl ParameterGateway for StalledGateway {
        async fn fetch_flat(
            &self,
            _names: &[String],
            _decrypt: bool,
        ) -> Result<Vec<RawParameter>, GatewayError> {
            futures::future::pending().await
        }

        async fn fetch_hierarchy(
            &self,
            _path: &str,
            _recursive: bool,
            _decrypt: bool,
        ) -> Result<Vec<RawParameter>, GatewayError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancellation_abandons_in_flight_fetches() {
        let token = CancellationToken::new();
        let orchestrator = orchestrator(StalledGateway).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            token.cancel();
        });

        let plan = PathPlan::new("/config/", &[], None);
        let error = orchestrator.resolve(&plan, &[]).await.unwrap_err();
        canceller.await.unwrap();

        assert_eq!(error.kind(), FetchErrorKind::Cancelled);
    }
}
