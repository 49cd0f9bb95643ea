//! Domain layer for the runcheck engine
//!
//! This module contains the run, result and configuration models together
//! with the port traits implemented by adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{EngineError, EngineResult, PlatformError, PlatformResult};
