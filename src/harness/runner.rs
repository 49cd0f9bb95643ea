//! Spec runner.
//!
//! Specs run one after another. Each spec is bounded by its own timeout;
//! expectations evaluated before the deadline are kept. A failing step
//! ends its spec but never the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{info, warn};

use super::assertions::AssertionVerifier;
use super::collector::{ResultCollector, SpecOutcome};
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{ExpectationDef, ExpectationResult, ResultTree, SpecDef, SuiteDef, TestProgram};
use crate::domain::ports::RunInvoker;
use crate::services::matchers::{Expected, MatcherRegistry};

/// Build the spec filter. Patterns are alternated; no patterns means
/// every spec runs.
pub fn spec_filter(patterns: &[String]) -> EngineResult<Option<Regex>> {
    let patterns: Vec<&str> = patterns
        .iter()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return Ok(None);
    }
    Regex::new(&patterns.join("|"))
        .map(Some)
        .map_err(|e| EngineError::Usage(format!("invalid filter: {e}")))
}

/// Runs the specs of a program one at a time, each under its timeout.
pub struct SpecRunner {
    invoker: Arc<dyn RunInvoker>,
    registry: Arc<MatcherRegistry>,
    default_timeout: Duration,
    filter: Option<Regex>,
    verbose: bool,
}

impl SpecRunner {
    /// Runner starting runs through `invoker` and checking them with the
    /// matchers in `registry`.
    pub fn new(
        invoker: Arc<dyn RunInvoker>,
        registry: Arc<MatcherRegistry>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            registry,
            default_timeout,
            filter: None,
            verbose: true,
        }
    }

    /// Only run specs whose full name matches. Other specs are excluded.
    pub fn with_filter(mut self, filter: Option<Regex>) -> Self {
        self.filter = filter;
        self
    }

    /// Log when each spec starts and finishes.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run the program under a top-level suite named after the test.
    pub async fn run(&self, program: &TestProgram, test_name: &str) -> ResultTree {
        let mut collector = ResultCollector::new();
        collector.suite(test_name, test_name);
        for suite in &program.suites {
            self.run_suite(suite, test_name, &mut collector).await;
        }
        collector.finish(test_name)
    }

    async fn run_suite(&self, suite: &SuiteDef, parent: &str, collector: &mut ResultCollector) {
        let full_name = format!("{parent} {}", suite.name);
        let index = collector.suite(&suite.name, &full_name);

        for spec in &suite.specs {
            let spec_name = format!("{full_name} {}", spec.name);
            let outcome = if self.is_selected(&spec_name) {
                self.run_spec(spec, &spec_name).await
            } else {
                SpecOutcome::excluded()
            };
            collector.spec(index, &spec.name, &spec_name, outcome);
        }

        for child in &suite.suites {
            Box::pin(self.run_suite(child, &full_name, collector)).await;
        }
    }

    fn is_selected(&self, full_name: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(full_name))
    }

    async fn run_spec(&self, spec: &SpecDef, full_name: &str) -> SpecOutcome {
        let timeout = spec
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        if self.verbose {
            info!(spec = %full_name, "spec started");
        }

        let started = Instant::now();
        let mut outcome = SpecOutcome::default();
        let finished = tokio::time::timeout(timeout, self.execute(spec, &mut outcome)).await;
        if finished.is_err() {
            warn!(spec = %full_name, timeout_ms = timeout.as_millis() as u64, "spec timed out");
            outcome.failed.push(ExpectationResult::failed(
                "timeout",
                format!(
                    "Timeout - spec did not complete within {}ms",
                    timeout.as_millis()
                ),
            ));
        }
        outcome.duration_ms = started.elapsed().as_millis() as u64;

        if self.verbose {
            info!(
                spec = %full_name,
                passed = outcome.passed.len(),
                failed = outcome.failed.len(),
                "spec finished"
            );
        }
        outcome
    }

    async fn execute(&self, spec: &SpecDef, outcome: &mut SpecOutcome) {
        for step in &spec.steps {
            let result = match self.invoker.invoke(step.run.clone()).await {
                Ok(result) => result,
                Err(err) => {
                    outcome
                        .failed
                        .push(ExpectationResult::failed("run", format!("Failed: {err}")));
                    return;
                }
            };

            for expectation in &step.expect {
                let verdict = self
                    .registry
                    .evaluate(
                        &expectation.matcher,
                        &result,
                        expected_of(expectation),
                        expectation.options.clone(),
                    )
                    .await;
                match verdict {
                    Ok(verdict) if verdict.pass => {
                        outcome.passed.push(ExpectationResult::passed(&expectation.matcher))
                    }
                    Ok(verdict) => outcome.failed.push(ExpectationResult::failed(
                        &expectation.matcher,
                        verdict.message.unwrap_or_default(),
                    )),
                    Err(err) => outcome.failed.push(ExpectationResult::failed(
                        &expectation.matcher,
                        format!("Failed: {err}"),
                    )),
                }
            }
        }
    }
}

fn expected_of(expectation: &ExpectationDef) -> Expected {
    match (&expectation.value, expectation.assert.is_empty()) {
        (Some(value), true) => Expected::Value(value.clone()),
        _ => Expected::Callback(Arc::new(AssertionVerifier::new(expectation.assert.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RunRequest, StepDef};
    use crate::services::matchers::test_support::Fixture;
    use serde_json::json;

    fn spec(name: &str, steps: Vec<StepDef>) -> SpecDef {
        SpecDef {
            name: name.to_string(),
            steps,
            timeout_ms: None,
        }
    }

    fn step(actor: &str, expect: Vec<ExpectationDef>) -> StepDef {
        StepDef {
            run: RunRequest::actor(actor),
            expect,
        }
    }

    fn status(value: &str) -> ExpectationDef {
        ExpectationDef {
            matcher: "toHaveStatus".to_string(),
            value: Some(json!(value)),
            options: vec![],
            assert: vec![],
        }
    }

    fn runner(fixture: &Fixture) -> SpecRunner {
        let registry = Arc::new(MatcherRegistry::with_defaults(fixture.ctx.clone()));
        SpecRunner::new(
            fixture.orchestrator.clone(),
            registry,
            Duration::from_secs(5),
        )
    }

    fn program(specs: Vec<SpecDef>) -> TestProgram {
        TestProgram {
            suites: vec![SuiteDef {
                name: "Scraper".to_string(),
                specs,
                suites: vec![],
            }],
        }
    }

    #[test]
    fn test_spec_filter_alternates_patterns() {
        assert!(spec_filter(&[]).unwrap().is_none());
        let filter = spec_filter(&["Scraper a".to_string(), "b$".to_string()])
            .unwrap()
            .unwrap();
        assert!(filter.is_match("Actor tests Scraper a"));
        assert!(filter.is_match("Actor tests Other b"));
        assert!(!filter.is_match("Actor tests Other c"));
        assert!(spec_filter(&["(".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_runs_specs_and_records_verdicts() {
        let fixture = Fixture::new().await;
        let tree = runner(&fixture)
            .run(
                &program(vec![
                    spec("ok", vec![step("a", vec![status("SUCCEEDED")])]),
                    spec("bad", vec![step("b", vec![status("FAILED")])]),
                ]),
                "Actor tests",
            )
            .await;

        assert_eq!(tree.suites.len(), 2);
        let specs = &tree.suites[1].specs;
        assert_eq!(specs[0].full_name, "Actor tests Scraper ok");
        assert!(!specs[0].has_failures());
        assert!(specs[1].has_failures());
        assert_eq!(specs[1].failed_expectations[0].matcher_name, "toHaveStatus");
    }

    #[tokio::test]
    async fn test_filter_excludes_specs() {
        let fixture = Fixture::new().await;
        let tree = runner(&fixture)
            .with_filter(spec_filter(&["Scraper ok".to_string()]).unwrap())
            .run(
                &program(vec![
                    spec("ok", vec![step("a", vec![status("SUCCEEDED")])]),
                    spec("other", vec![step("b", vec![status("SUCCEEDED")])]),
                ]),
                "Actor tests",
            )
            .await;

        let specs = &tree.suites[1].specs;
        assert_eq!(specs[1].status, crate::domain::models::SpecStatus::Excluded);
        assert_eq!(fixture.platform.start_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_only_its_spec() {
        let fixture = Fixture::new().await;
        let invalid = StepDef {
            run: RunRequest::default(),
            expect: vec![status("SUCCEEDED")],
        };
        let tree = runner(&fixture)
            .run(
                &program(vec![
                    spec("broken", vec![invalid]),
                    spec("fine", vec![step("a", vec![status("SUCCEEDED")])]),
                ]),
                "Actor tests",
            )
            .await;

        let specs = &tree.suites[1].specs;
        assert_eq!(specs[0].failed_expectations[0].matcher_name, "run");
        assert!(specs[0].failed_expectations[0].message.starts_with("Failed: Invalid run request"));
        assert!(!specs[1].has_failures());
    }

    #[tokio::test]
    async fn test_timeout_keeps_earlier_expectations() {
        let fixture = Fixture::new().await;
        fixture.platform.set_start_delay(Duration::from_secs(30));
        let mut slow = spec("slow", vec![step("a", vec![status("SUCCEEDED")])]);
        slow.timeout_ms = Some(50);

        let tree = runner(&fixture).run(&program(vec![slow]), "Actor tests").await;
        let failed = &tree.suites[1].specs[0].failed_expectations;
        assert_eq!(failed[0].matcher_name, "timeout");
        assert_eq!(failed[0].message, "Timeout - spec did not complete within 50ms");
    }
}
