//! Assertion protocol.
//!
//! Every matcher is an async comparison of a finished run against an
//! expected value or a verifier callback. Dependencies arrive through an
//! injected [`MatcherContext`]; the [`MatcherRegistry`] is built once per
//! session and checks the run precondition before any matcher runs.

pub mod checker;
pub mod registry;
pub mod status;
pub mod storage;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::domain::errors::EngineResult;
use crate::domain::models::{EngineConfig, RunResult};
use crate::domain::ports::{Platform, RunInvoker};

pub use checker::{WithChecker, WithDuplicates};
pub use registry::MatcherRegistry;
pub use status::{ToHaveStatus, WithLog, WithRunInfo};
pub use storage::{WithDataset, WithKeyValueStore, WithOutput, WithRequestQueue, WithStatistics};

/// Caller supplied check over the artifact a matcher fetched. `Err` carries
/// the failure message.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Check `subject`.
    async fn verify(&self, subject: &Value) -> Result<(), String>;
}

/// Right-hand side of an expectation.
#[derive(Clone)]
pub enum Expected {
    /// Compared for equality with the fetched artifact
    Value(Value),
    /// Handed the fetched artifact
    Callback(Arc<dyn Verifier>),
}

impl fmt::Debug for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Expected::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Result of one matcher call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the expectation held
    pub pass: bool,
    /// Failure text, with the run header
    pub message: Option<String>,
}

impl Verdict {
    /// A passing verdict.
    pub fn pass() -> Self {
        Self {
            pass: true,
            message: None,
        }
    }

    /// A failing verdict.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            pass: false,
            message: Some(message.into()),
        }
    }
}

/// One-shot delay before the first storage read, shared by all matchers.
/// Storages on the platform need a moment to settle after a run finishes.
#[derive(Debug)]
pub struct Settlement {
    delay: Duration,
    done: OnceCell<()>,
}

impl Settlement {
    /// Settlement waiting `delay` once.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            done: OnceCell::new(),
        }
    }

    /// Wait out the delay on first call. Concurrent callers wait together.
    pub async fn settle(&self) {
        self.done
            .get_or_init(|| async {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
            })
            .await;
    }

    /// True once the delay has passed.
    pub fn has_settled(&self) -> bool {
        self.done.initialized()
    }
}

/// Dependencies shared by every matcher call.
#[derive(Clone)]
pub struct MatcherContext {
    /// Platform storages are read from
    pub platform: Arc<dyn Platform>,
    /// Starts auxiliary runs such as the checker
    pub invoker: Arc<dyn RunInvoker>,
    /// Delay before the first storage read
    pub settlement: Arc<Settlement>,
    /// Engine settings
    pub config: EngineConfig,
}

impl MatcherContext {
    /// Context settling storages for `config.dataset_settle_ms`.
    pub fn new(
        platform: Arc<dyn Platform>,
        invoker: Arc<dyn RunInvoker>,
        config: EngineConfig,
    ) -> Self {
        let settlement = Arc::new(Settlement::new(Duration::from_millis(
            config.dataset_settle_ms,
        )));
        Self {
            platform,
            invoker,
            settlement,
            config,
        }
    }
}

/// Arguments of one matcher call.
pub struct MatcherInput<'a> {
    /// Run under test
    pub result: &'a RunResult,
    /// Value or callback the artifact is checked against
    pub expected: Expected,
    /// Positional option objects, consumed front to back
    pub args: VecDeque<Value>,
    /// Shared dependencies
    pub ctx: &'a MatcherContext,
}

impl MatcherInput<'_> {
    /// Prefix a message with the run header.
    pub fn format(&self, message: &str) -> String {
        self.result.format(message)
    }

    /// Take the next option object; missing or empty slots yield `{}`.
    pub fn next_options(&mut self) -> Value {
        match self.args.pop_front() {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Value::Object(Map::new()),
            Some(value) => value,
        }
    }

    /// Hand the fetched artifact to the expected callback.
    pub async fn check(&self, subject: Value) -> Verdict {
        match &self.expected {
            Expected::Callback(verifier) => match verifier.verify(&subject).await {
                Ok(()) => Verdict::pass(),
                Err(message) => Verdict::fail(self.format(&message)),
            },
            Expected::Value(expected) if *expected == subject => Verdict::pass(),
            Expected::Value(expected) => Verdict::fail(self.format(&format!(
                "Expected {expected} to equal {subject}"
            ))),
        }
    }
}

/// A named expectation over a finished run.
#[async_trait]
pub trait Matcher: Send + Sync {
    /// Name used in test programs, e.g. `withDataset`.
    fn name(&self) -> &'static str;

    /// Fetch what the matcher looks at and check it.
    ///
    /// `Err` means the matcher was misused or could not run. A failed check
    /// is an `Ok` verdict.
    async fn compare(&self, input: MatcherInput<'_>) -> EngineResult<Verdict>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_settlement_sleeps_once() {
        let settlement = Settlement::new(Duration::from_millis(20));
        assert!(!settlement.has_settled());

        let start = std::time::Instant::now();
        settlement.settle().await;
        assert!(start.elapsed() >= Duration::from_millis(20));

        let again = std::time::Instant::now();
        settlement.settle().await;
        assert!(again.elapsed() < Duration::from_millis(20));
        assert!(settlement.has_settled());
    }

    #[tokio::test]
    async fn test_options_are_consumed_left_to_right() {
        let fixture = test_support::Fixture::new().await;
        let result = fixture.run("X").await;
        let mut input = fixture.input(
            &result,
            Expected::Value(Value::Null),
            vec![json!({ "a": 1 }), Value::Null],
        );

        assert_eq!(input.next_options(), json!({ "a": 1 }));
        assert_eq!(input.next_options(), json!({}));
        assert_eq!(input.next_options(), json!({}));
    }

    #[tokio::test]
    async fn test_callback_failure_is_formatted() {
        let fixture = test_support::Fixture::new().await;
        let result = fixture.run("X").await;
        let verifier = test_support::Recording::failing("too few items");
        let input = fixture.input(&result, Expected::Callback(verifier.clone()), vec![]);

        let verdict = input.check(json!({ "n": 1 })).await;
        assert!(!verdict.pass);
        let message = verdict.message.unwrap();
        assert!(message.contains("too few items"));
        assert!(message.contains(&result.link()));
        assert_eq!(verifier.seen(), Some(json!({ "n": 1 })));
    }
}
