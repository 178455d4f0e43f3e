//! # Common
//!
//! Shared building blocks for the parameter store client crates.
//!
//! ## Key Features
//! - Layered configuration loading (defaults, TOML file, environment variables)
//! - Configuration types for the parameter store, service discovery and application identity
//! - Error definitions shared by every crate in the workspace
//!
//! ## Design Principles
//! - Minimal dependencies to avoid bloat in dependent crates
//! - Serde support on every configuration type
//! - Validation kept next to the type it validates

pub mod config;
pub mod error;

// Re-export commonly used types at the crate root for convenience
pub use config::*;
pub use error::*;

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
