//! # Property Source Assembly
//!
//! Accumulates decoded entries under their property-source names for one
//! resolution call, then ranks and emits the finished sources.

use crate::naming::is_profile_specific;
use crate::parameter::DecodedEntry;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Added to the base priority of every source without a profile marker
pub const COMMON_PRIORITY_OFFSET: i32 = 100;

/// Added to the base priority of profile-specific sources
pub const PROFILE_PRIORITY_OFFSET: i32 = 150;

/// Added when a source belongs to the configured service identity
pub const SERVICE_PRIORITY_BONUS: i32 = 10;

/// A named, prioritized set of configuration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySource {
    name: String,
    values: IndexMap<String, String>,
    priority: i32,
}

impl PropertySource {
    pub fn new(name: impl Into<String>, values: IndexMap<String, String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            values,
            priority,
        }
    }

    /// Externally visible name, `<tag>-<source name>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in first-insertion order
    pub fn values(&self) -> &IndexMap<String, String> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn into_values(self) -> IndexMap<String, String> {
        self.values
    }
}

/// Priority rules applied once per source name at emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityRules {
    base_priority: i32,
    service_id: Option<String>,
}

impl PriorityRules {
    pub fn new(base_priority: i32, service_id: Option<String>) -> Self {
        Self {
            base_priority,
            service_id,
        }
    }

    /// Profile-specific names outrank common ones; names belonging to the
    /// service identity get a further bonus.
    pub fn priority(&self, name: &str) -> i32 {
        let mut priority = self.base_priority
            + if is_profile_specific(name) {
                PROFILE_PRIORITY_OFFSET
            } else {
                COMMON_PRIORITY_OFFSET
            };

        if self
            .service_id
            .as_deref()
            .is_some_and(|service_id| name.starts_with(service_id))
        {
            priority += SERVICE_PRIORITY_BONUS;
        }

        priority
    }
}

/// Call-scoped accumulator from source name to merged values
#[derive(Debug, Default)]
pub struct PropertySourceAssembler {
    sources: IndexMap<String, IndexMap<String, String>>,
}

impl PropertySourceAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge entries into every named source; later entries win
    pub fn merge(&mut self, names: &BTreeSet<String>, entries: &[DecodedEntry]) {
        for name in names {
            let values = self.sources.entry(name.clone()).or_default();
            for entry in entries {
                values.insert(entry.key.clone(), entry.value.clone());
            }
            debug!(source = %name, entries = entries.len(), "Merged parameter entries");
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Rank and name the accumulated sources, dropping empty ones
    pub fn finish(self, rules: &PriorityRules, source_tag: &str) -> Vec<PropertySource> {
        self.sources
            .into_iter()
            .filter(|(name, values)| {
                if values.is_empty() {
                    debug!(source = %name, "Skipping empty property source");
                }
                !values.is_empty()
            })
            .map(|(name, values)| {
                let priority = rules.priority(&name);
                PropertySource::new(format!("{source_tag}-{name}"), values, priority)
            })
            .collect()
    }
}

/// Value of `key` as a consumer ranking sources by priority would read it
///
/// The highest priority source holding the key wins; among equal priorities
/// the later source wins.
pub fn effective_value<'a>(sources: &'a [PropertySource], key: &str) -> Option<&'a str> {
    sources
        .iter()
        .filter_map(|source| source.get(key).map(|value| (source.priority(), value)))
        .max_by_key(|(priority, _)| *priority)
        .map(|(_, value)| value)
}
