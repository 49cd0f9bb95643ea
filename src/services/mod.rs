//! Engine services: fingerprinting, the call cache, run orchestration,
//! assertions, failure aggregation and the retry decision.

pub mod call_cache;
pub mod checkpoint;
pub mod failure_aggregator;
pub mod fingerprint;
pub mod matchers;
pub mod notification;
pub mod retry_controller;
pub mod run_orchestrator;

pub use call_cache::{CallCache, CALLS_KEY};
pub use checkpoint::{CheckpointHandler, CheckpointHub, CheckpointRegistration};
pub use failure_aggregator::{linkify, reduce, LinkFormat};
pub use fingerprint::fingerprint;
pub use matchers::{Expected, Matcher, MatcherContext, MatcherRegistry, Verdict, Verifier};
pub use notification::{failure_notification, timeout_notification, NotificationContext};
pub use retry_controller::{Decision, RetryController, RetryState};
pub use run_orchestrator::{OrchestratorSettings, RunOrchestrator};
