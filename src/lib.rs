//! runcheck - end-to-end tests for remote actor and task runs
//!
//! Test programs start runs on a remote execution platform, wait for them
//! to finish and assert on their status, logs and storages. Each distinct
//! request is invoked at most once, even across process restarts, and a
//! failing pass can relaunch itself narrowed to the failing specs.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): run, result and configuration models plus port traits
//! - **Service Layer** (`services`): orchestration, matchers, aggregation and retry
//! - **Harness** (`harness`): declarative test programs and the spec runner
//! - **Application Layer** (`application`): a full test pass and signal handling
//! - **Adapters** (`adapters`): platform client, state stores, notifier, relauncher
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod harness;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{SessionDeps, SessionOutcome, TestSession};
pub use domain::models::{Config, ResultTree, RunRequest, RunResult, TestProgram, TestRunInput};
pub use domain::ports::{Platform, RunInvoker, StateStore};
pub use domain::{EngineError, EngineResult, PlatformError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{MatcherRegistry, RunOrchestrator};
