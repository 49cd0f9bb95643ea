//! Matcher registry: name lookup plus the run precondition.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use super::{
    Expected, Matcher, MatcherContext, MatcherInput, ToHaveStatus, Verdict, WithChecker,
    WithDataset, WithDuplicates, WithKeyValueStore, WithLog, WithOutput, WithRequestQueue,
    WithRunInfo, WithStatistics,
};
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::RunResult;

/// Matchers by name, sharing one [`MatcherContext`].
pub struct MatcherRegistry {
    matchers: BTreeMap<&'static str, Arc<dyn Matcher>>,
    ctx: MatcherContext,
}

impl MatcherRegistry {
    /// Empty registry over a context.
    pub fn new(ctx: MatcherContext) -> Self {
        Self {
            matchers: BTreeMap::new(),
            ctx,
        }
    }

    /// Registry with every built-in matcher.
    pub fn with_defaults(ctx: MatcherContext) -> Self {
        let mut registry = Self::new(ctx);
        registry.register(Arc::new(ToHaveStatus));
        registry.register(Arc::new(WithLog));
        registry.register(Arc::new(WithRunInfo));
        registry.register(Arc::new(WithOutput));
        registry.register(Arc::new(WithKeyValueStore));
        registry.register(Arc::new(WithStatistics));
        registry.register(Arc::new(WithDataset));
        registry.register(Arc::new(WithRequestQueue));
        registry.register(Arc::new(WithChecker));
        registry.register(Arc::new(WithDuplicates));
        registry
    }

    /// Add a matcher, replacing any registered under the same name.
    pub fn register(&mut self, matcher: Arc<dyn Matcher>) {
        self.matchers.insert(matcher.name(), matcher);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.keys().copied().collect()
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.matchers.contains_key(name)
    }

    /// Context handed to every matcher call.
    pub fn context(&self) -> &MatcherContext {
        &self.ctx
    }

    /// Evaluate one expectation.
    ///
    /// A result that did not come out of a finished invocation is a usage
    /// error and never reaches the matcher.
    pub async fn evaluate(
        &self,
        name: &str,
        result: &RunResult,
        expected: Expected,
        args: Vec<Value>,
    ) -> EngineResult<Verdict> {
        let matcher = self
            .matchers
            .get(name)
            .ok_or_else(|| EngineError::Usage(format!("unknown matcher \"{name}\"")))?;

        if !result.is_valid() {
            return Err(EngineError::Usage(
                "assertion on a non-run result. Did you forget to run()?".to_string(),
            ));
        }

        matcher
            .compare(MatcherInput {
                result,
                expected,
                args: VecDeque::from(args),
                ctx: &self.ctx,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Fingerprint, RunRecord};
    use crate::services::matchers::test_support::Fixture;
    use serde_json::json;

    #[tokio::test]
    async fn test_defaults_cover_every_matcher() {
        let fixture = Fixture::new().await;
        let registry = MatcherRegistry::with_defaults(fixture.ctx.clone());
        assert_eq!(
            registry.names(),
            vec![
                "toHaveStatus",
                "withChecker",
                "withDataset",
                "withDuplicates",
                "withKeyValueStore",
                "withLog",
                "withOutput",
                "withRequestQueue",
                "withRunInfo",
                "withStatistics",
            ]
        );
    }

    #[tokio::test]
    async fn test_non_run_result_is_a_usage_error() {
        let fixture = Fixture::new().await;
        let registry = MatcherRegistry::with_defaults(fixture.ctx.clone());
        let mut record: RunRecord = fixture.run("X").await.record;
        record.fingerprint = Fingerprint::new("");
        let bogus = RunResult::new(record, None, "https://console.apify.com");

        let outcome = registry
            .evaluate("toHaveStatus", &bogus, Expected::Value(json!("SUCCEEDED")), vec![])
            .await;
        assert!(matches!(outcome, Err(EngineError::Usage(_))));
    }

    #[tokio::test]
    async fn test_unknown_matcher_is_a_usage_error() {
        let fixture = Fixture::new().await;
        let registry = MatcherRegistry::with_defaults(fixture.ctx.clone());
        let result = fixture.run("X").await;

        let outcome = registry
            .evaluate("toBeFast", &result, Expected::Value(Value::Null), vec![])
            .await;
        assert!(matches!(outcome, Err(EngineError::Usage(_))));
    }

    #[tokio::test]
    async fn test_evaluate_dispatches_by_name() {
        let fixture = Fixture::new().await;
        let registry = MatcherRegistry::with_defaults(fixture.ctx.clone());
        let result = fixture.run("X").await;

        let verdict = registry
            .evaluate("toHaveStatus", &result, Expected::Value(json!("SUCCEEDED")), vec![])
            .await
            .unwrap();
        assert!(verdict.pass);
    }
}
