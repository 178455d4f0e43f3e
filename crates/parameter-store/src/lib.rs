//! # Parameter Store
//!
//! Resolves an application's distributed configuration from a hierarchical
//! remote parameter store into prioritized, named property sources.
//!
//! A resolution call plans the paths to query for an application's profiles
//! and service identity, fetches the flat parameters and nested hierarchies
//! below them, decodes `key=value` encodings and merges the results into
//! property sources a configuration layer can rank by priority.

pub mod assembler;
pub mod client;
pub mod error;
pub mod gateway;
pub mod naming;
pub mod orchestrator;
pub mod parameter;
pub mod planner;
pub mod retry;


pub use assembler::{effective_value, PriorityRules, PropertySource, PropertySourceAssembler};
pub use client::{ConfigurationClient, ParameterStoreClient, ResolutionContext};
pub use error::{
    ConfigurationFetchError, ErrorCategory, FetchErrorKind, GatewayError,
    MalformedParameterError, RetryConfig,
};
pub use gateway::{InMemoryParameterStore, ParameterGateway};
pub use naming::{ProfileSuffixNaming, SourceNamingPolicy};
pub use orchestrator::FetchOrchestrator;
pub use parameter::{decode_parameter, DecodedEntry, ParameterType, RawParameter};
pub use planner::{LookupPath, PathKind, PathPlan, DEFAULT_ENVIRONMENT_NAME};
pub use retry::{ExponentialBackoff, RetryExecutor, RetryingGateway};
