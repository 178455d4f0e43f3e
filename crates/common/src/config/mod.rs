//! # Configuration
//!
//! Configuration types for the parameter store client and the figment-based
//! loader that fills them from defaults, files and the environment.

pub mod loader;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use loader::*;
pub use traits::*;
pub use types::*;
