//! # Chainwatch Config
//!
//! TOML (and JSON/YAML) configuration loading for the listener, the only
//! persisted input the core reads.
//!
//! - **types**: the configuration schema, with `[[targets.enhanced_targets]]`
//!   as a first-class table.
//! - **loader**: `ConfigLoader` — file → format dispatch → env overrides →
//!   cross-field validation.
//! - **error**: `ConfigError`, the fatal-at-startup / rejected-at-runtime
//!   taxonomy.

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::*;
