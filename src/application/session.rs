//! One pass of a test run.
//!
//! The session wires the orchestrator, matchers and harness together,
//! runs the program, writes `OUTPUT`, then notifies and applies the retry
//! decision. `OUTPUT` is always written before a failure is surfaced.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{Config, FailureSummary, HostEnv, ResultTree, TestRunInput};
use crate::domain::ports::{Notifier, Platform, ProgramContext, Relauncher, StateStore, TestProgramLoader};
use crate::harness::{spec_filter, SpecRunner};
use crate::services::{
    failure_notification, reduce, CheckpointHub, Decision, MatcherContext, MatcherRegistry,
    NotificationContext, OrchestratorSettings, RetryController, RunOrchestrator,
};

/// Record the result tree is written to.
pub const OUTPUT_KEY: &str = "OUTPUT";

/// Name used when neither the input nor the host task provides one.
pub const DEFAULT_TEST_NAME: &str = "Actor tests";

/// Collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    /// Remote platform runs are started on
    pub platform: Arc<dyn Platform>,
    /// Default store of this run; holds `CALLS` and `OUTPUT`
    pub store: Arc<dyn StateStore>,
    /// Receives the failure notification
    pub notifier: Arc<dyn Notifier>,
    /// Starts the retry pass
    pub relauncher: Arc<dyn Relauncher>,
    /// Parses the test program source
    pub loader: Arc<dyn TestProgramLoader>,
    /// Hub the call cache registers its checkpoint handler with
    pub checkpoints: Arc<CheckpointHub>,
}

/// What a finished pass produced.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Result tree, as written to `OUTPUT`
    pub tree: ResultTree,
    /// Summary derived from the tree
    pub summary: FailureSummary,
    /// What the retry controller decided
    pub decision: Decision,
}

/// One test pass: load, run, report, then decide whether to relaunch.
pub struct TestSession {
    config: Config,
    input: TestRunInput,
    host: HostEnv,
    deps: SessionDeps,
}

impl TestSession {
    /// Session for one pass over `input`.
    pub fn new(config: Config, input: TestRunInput, host: HostEnv, deps: SessionDeps) -> Self {
        Self {
            config,
            input,
            host,
            deps,
        }
    }

    /// Input the pass runs with.
    pub fn input(&self) -> &TestRunInput {
        &self.input
    }

    /// Test name from the input, else the name of the task this run
    /// belongs to, else [`DEFAULT_TEST_NAME`].
    pub async fn test_name(&self) -> String {
        if let Some(name) = self.input.test_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(task_id) = self.host.actor_task_id.as_deref() {
            match self.deps.platform.get_task(task_id).await {
                Ok(task) if !task.name.is_empty() => return task.name,
                Ok(_) => {}
                Err(err) => warn!(task_id, error = %err, "could not resolve task name"),
            }
        }
        DEFAULT_TEST_NAME.to_string()
    }

    /// Links shown in notifications for this run.
    pub fn notification_context(&self, test_name: &str) -> NotificationContext {
        let mut ctx = NotificationContext::new(test_name);
        if let Some(run_id) = self.host.actor_run_id.as_deref() {
            ctx = ctx.with_run(&self.config.platform.console_url, run_id);
        }
        if let Some(store_id) = self.host.default_key_value_store_id.as_deref() {
            ctx = ctx.with_output(&self.config.platform.api_base_url, store_id);
        }
        ctx
    }

    /// Run one pass. A relaunch decision is applied before returning; a
    /// process relauncher does not come back on success.
    #[instrument(skip(self), fields(retry_epoch = self.input.retry_epoch))]
    pub async fn execute(&self) -> EngineResult<SessionOutcome> {
        let source = self
            .input
            .test_spec
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EngineError::Usage("Missing required input \"testSpec\" parameter".to_string()))?;
        let filter = spec_filter(&self.input.filter)?;
        let test_name = self.test_name().await;

        let orchestrator = RunOrchestrator::start(
            Arc::clone(&self.deps.platform),
            Arc::clone(&self.deps.store),
            Arc::clone(&self.deps.checkpoints),
            OrchestratorSettings::from_config(&self.config, &self.input),
        )
        .await;
        let ticker = self
            .deps
            .checkpoints
            .spawn_interval(Duration::from_secs(self.config.engine.persist_interval_secs.max(1)));

        let registry = Arc::new(MatcherRegistry::with_defaults(MatcherContext::new(
            Arc::clone(&self.deps.platform),
            orchestrator.clone(),
            self.config.engine.clone(),
        )));

        let context = ProgramContext {
            test_name: test_name.clone(),
            custom_data: match &self.input.custom_data {
                Value::Null => json!({}),
                data => data.clone(),
            },
            matchers: registry.names(),
        };

        let pass = async {
            let program = self.deps.loader.load(source, &context)?;
            let runner = SpecRunner::new(
                orchestrator.clone(),
                Arc::clone(&registry),
                Duration::from_millis(self.input.default_timeout),
            )
            .with_filter(filter)
            .with_verbose(self.input.verbose_logs);

            let mut tree = runner.run(&program, &test_name).await;
            tree.retry_epoch = self.input.retry_epoch;
            self.deps
                .store
                .set_value(OUTPUT_KEY, &serde_json::to_value(&tree)?)
                .await?;
            Ok::<_, EngineError>(tree)
        };
        let tree = pass.await;

        ticker.abort();
        let persisted = orchestrator.shutdown().await;
        let tree = tree?;
        persisted?;

        let summary = reduce(&tree);
        info!(
            total_specs = summary.total_spec_count,
            failing_specs = summary.failing_spec_count,
            failed_expectations = summary.failed_expectations.len(),
            "test pass finished"
        );

        let decision = RetryController::from_input(&self.input).decide(&summary);
        if decision.should_notify() && summary.has_failures() {
            let ctx = self.notification_context(&test_name);
            self.deps
                .notifier
                .notify(&failure_notification(&ctx, &summary))
                .await;
        }

        if let Decision::Relaunch(plan) = &decision {
            info!(filter = ?plan.filter, retry_epoch = plan.retry_epoch, "relaunching failing specs");
            self.deps.relauncher.relaunch(plan).await?;
        }

        Ok(SessionOutcome {
            tree,
            summary,
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MemoryStore, MockPlatform};
    use crate::domain::models::RelaunchPlan;
    use crate::domain::ports::Notification;
    use crate::harness::DeclarativeLoader;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        notifications: Mutex<Vec<Notification>>,
        plans: Mutex<Vec<RelaunchPlan>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, notification: &Notification) {
            self.notifications.lock().unwrap().push(notification.clone());
        }
    }

    #[async_trait]
    impl Relauncher for Recorder {
        async fn relaunch(&self, plan: &RelaunchPlan) -> EngineResult<()> {
            self.plans.lock().unwrap().push(plan.clone());
            Ok(())
        }
    }

    const PROGRAM: &str = r#"
suites:
  - name: Scraper
    specs:
      - name: status
        steps:
          - run: { actorId: my/actor }
            expect:
              - { matcher: toHaveStatus, value: FAILED }
"#;

    fn session(input: TestRunInput) -> (TestSession, Arc<MemoryStore>, Arc<Recorder>) {
        let mut config = Config::default();
        config.engine.poll_interval_ms = 1;
        config.engine.input_settle_ms = 0;
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let deps = SessionDeps {
            platform: Arc::new(MockPlatform::new()),
            store: store.clone(),
            notifier: recorder.clone(),
            relauncher: recorder.clone(),
            loader: Arc::new(DeclarativeLoader::new()),
            checkpoints: Arc::new(CheckpointHub::new()),
        };
        let host = HostEnv {
            actor_run_id: Some("self-run".to_string()),
            default_key_value_store_id: Some("self-kv".to_string()),
            ..Default::default()
        };
        (TestSession::new(config, input, host, deps), store, recorder)
    }

    #[tokio::test]
    async fn test_missing_program_is_a_usage_error() {
        let (session, _, _) = session(TestRunInput::default());
        let err = session.execute().await.unwrap_err();
        assert!(matches!(err, EngineError::Usage(ref m) if m.contains("testSpec")));
    }

    #[tokio::test]
    async fn test_failing_pass_writes_output_and_notifies() {
        let (session, store, recorder) = session(TestRunInput {
            test_spec: Some(PROGRAM.to_string()),
            slack_token: Some("x".to_string()),
            slack_channel: Some("#qa".to_string()),
            ..Default::default()
        });

        let outcome = session.execute().await.unwrap();
        assert!(matches!(outcome.decision, Decision::Failure { failing_specs: 1, .. }));

        let output = store.snapshot(OUTPUT_KEY).unwrap();
        assert_eq!(output["testName"], "Actor tests");
        assert!(store.snapshot("CALLS").is_some());

        let sent = recorder.notifications.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .slack_message
            .as_deref()
            .unwrap()
            .contains("/view/runs/self-run|Actor tests>"));
        assert!(sent[0].slack_message.as_deref().unwrap().contains("Scraper status\n"));
        assert!(sent[0]
            .email_message
            .as_deref()
            .unwrap()
            .contains("<b>Scraper status</b><br>"));
        assert!(recorder.plans.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_mode_relaunches_without_notifying() {
        let (session, _, recorder) = session(TestRunInput {
            test_spec: Some(PROGRAM.to_string()),
            test_name: Some("Nightly".to_string()),
            retry_failed_tests: true,
            ..Default::default()
        });

        let outcome = session.execute().await.unwrap();
        assert!(matches!(outcome.decision, Decision::Relaunch(_)));
        assert!(recorder.notifications.lock().unwrap().is_empty());

        let plans = recorder.plans.lock().unwrap();
        assert_eq!(plans[0].filter, vec!["Scraper status"]);
        assert_eq!(plans[0].retry_epoch, 1);
        assert!(!plans[0].retry_failed_tests);
    }
}
