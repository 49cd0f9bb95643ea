//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Test input assembly from the run record, files and overrides

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, InputOverrides, InputSources, RELAUNCH_ENV};
