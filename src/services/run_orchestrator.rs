//! Run orchestrator: invoke-if-absent, wait until terminal, return an
//! enriched result.
//!
//! At most one remote invocation happens per fingerprint for the lifetime
//! of the persisted call cache, which survives restarts. The lookup and
//! the insert are separate critical sections: two identical requests
//! issued before either start call returns will both reach the platform.

use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::EngineResult;
use crate::domain::models::{
    run::run_link, Config, Fingerprint, RunData, RunRecord, RunRequest, RunResult, RunTarget,
    TestRunInput,
};
use crate::domain::ports::{Platform, RunInvoker, StateStore};
use crate::services::call_cache::CallCache;
use crate::services::checkpoint::{CheckpointHandler, CheckpointHub, CheckpointRegistration};
use crate::services::fingerprint::fingerprint;

/// Record every run stores its effective input under.
const INPUT_KEY: &str = "INPUT";

/// Orchestrator timings and presentation settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Wait before reading a finished run's `INPUT` record
    pub input_settle: Duration,
    /// Epoch mixed into every fingerprint
    pub retry_epoch: u32,
    /// Log waits and completions
    pub verbose_logs: bool,
    /// Console root used for run links
    pub console_url: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            input_settle: Duration::from_secs(1),
            retry_epoch: 0,
            verbose_logs: false,
            console_url: "https://console.apify.com".to_string(),
        }
    }
}

impl OrchestratorSettings {
    /// Settings for a pass over `input`.
    pub fn from_config(config: &Config, input: &TestRunInput) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.engine.poll_interval_ms),
            input_settle: Duration::from_millis(config.engine.input_settle_ms),
            retry_epoch: input.retry_epoch,
            verbose_logs: input.verbose_logs,
            console_url: config.platform.console_url.clone(),
        }
    }
}

/// Starts runs at most once per fingerprint and waits for them.
///
/// The call cache is persisted after every start and every wait, and
/// whenever the checkpoint hub fires, so a restarted process reuses the
/// runs this one started.
pub struct RunOrchestrator {
    platform: Arc<dyn Platform>,
    store: Arc<dyn StateStore>,
    cache: Mutex<CallCache>,
    settings: OrchestratorSettings,
    checkpoints: Arc<CheckpointHub>,
    registration: StdMutex<Option<CheckpointRegistration>>,
}

/// Flushes the call cache whenever the host checkpoints.
struct FlushOnCheckpoint(Weak<RunOrchestrator>);

#[async_trait]
impl CheckpointHandler for FlushOnCheckpoint {
    async fn on_checkpoint(&self) {
        if let Some(orchestrator) = self.0.upgrade() {
            if let Err(err) = orchestrator.flush().await {
                warn!(error = %err, "failed to persist call cache on checkpoint");
            }
        }
    }
}

impl RunOrchestrator {
    /// Load the persisted call cache and register the checkpoint handler.
    pub async fn start(
        platform: Arc<dyn Platform>,
        store: Arc<dyn StateStore>,
        checkpoints: Arc<CheckpointHub>,
        settings: OrchestratorSettings,
    ) -> Arc<Self> {
        let cache = CallCache::load(store.as_ref()).await;
        if !cache.is_empty() {
            info!(entries = cache.len(), "resuming with recorded calls");
        }

        let orchestrator = Arc::new(Self {
            platform,
            store,
            cache: Mutex::new(cache),
            settings,
            checkpoints: Arc::clone(&checkpoints),
            registration: StdMutex::new(None),
        });

        let handler = Arc::new(FlushOnCheckpoint(Arc::downgrade(&orchestrator)));
        let registration = checkpoints.register(handler);
        if let Ok(mut slot) = orchestrator.registration.lock() {
            *slot = Some(registration);
        }

        orchestrator
    }

    /// Settings the orchestrator was started with.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Persist the call cache.
    pub async fn flush(&self) -> EngineResult<()> {
        let snapshot = self.cache.lock().await.clone();
        snapshot.flush(self.store.as_ref()).await
    }

    /// Deregister from the checkpoint hub and persist one last time.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let registration = self.registration.lock().ok().and_then(|mut slot| slot.take());
        if let Some(registration) = registration {
            self.checkpoints.deregister(registration);
        }
        self.flush().await
    }

    /// Every run recorded so far, in insertion order.
    pub async fn recorded_calls(&self) -> Vec<RunRecord> {
        self.cache.lock().await.iter().cloned().collect()
    }

    /// Start `request` unless a run is recorded for its fingerprint, then
    /// wait for the run to finish.
    #[instrument(skip(self, request), fields(fingerprint))]
    pub async fn invoke(&self, request: RunRequest) -> EngineResult<RunResult> {
        let target = request.target()?;
        let fingerprint = fingerprint(&request, self.settings.retry_epoch)?;
        tracing::Span::current().record("fingerprint", fingerprint.as_str());

        let cached = self.cache.lock().await.get(&fingerprint).cloned();
        let record = match cached {
            Some(record) => {
                debug!(run_id = %record.run_id, "reusing recorded run");
                record
            }
            None => {
                let started = self.start_run(&request, &target, fingerprint.clone()).await?;
                let mut cache = self.cache.lock().await;
                cache.insert(started.clone());
                cache.get(&fingerprint).cloned().unwrap_or(started)
            }
        };

        self.flush().await?;

        let link = run_link(&self.settings.console_url, &record.data, &record.run_id);
        if self.settings.verbose_logs {
            info!(run_id = %record.run_id, "Waiting {target} to finish: {link}");
        }

        self.wait_for_finish(&record.run_id).await;

        if self.settings.verbose_logs {
            info!(run_id = %record.run_id, "Run {target} finished: {link}");
        }

        self.flush().await?;

        if !self.settings.input_settle.is_zero() {
            tokio::time::sleep(self.settings.input_settle).await;
        }
        let input = self.resolved_input(&record).await;

        Ok(RunResult::new(record, input, self.settings.console_url.clone()))
    }

    async fn start_run(
        &self,
        request: &RunRequest,
        target: &RunTarget,
        fingerprint: Fingerprint,
    ) -> EngineResult<RunRecord> {
        let input = match target {
            RunTarget::Actor(actor_id) if request.options.prefilled_input => {
                self.prefilled_input(actor_id, request).await?
            }
            _ => request.input.clone(),
        };

        let run = self
            .platform
            .start_run(target, &input, &request.options)
            .await?;
        info!(run_id = %run.id, %target, "started run");

        let actor = self.platform.get_actor(&run.act_id).await?;
        let (task_id, task_name) = match target {
            RunTarget::Task(task_id) => {
                let task = self.platform.get_task(task_id).await?;
                (Some(task_id.clone()), Some(task.name))
            }
            RunTarget::Actor(_) => (run.actor_task_id.clone(), None),
        };

        Ok(RunRecord {
            fingerprint,
            run_id: run.id,
            data: RunData {
                act_id: run.act_id,
                default_dataset_id: run.default_dataset_id,
                default_key_value_store_id: run.default_key_value_store_id,
                default_request_queue_id: run.default_request_queue_id,
                build_number: run.build_number.unwrap_or_default(),
                actor_name: actor.name,
                task_name,
                task_id,
                name: request.name.clone(),
            },
        })
    }

    /// Merge the actor build's declared prefills under the caller's input.
    async fn prefilled_input(&self, actor_id: &str, request: &RunRequest) -> EngineResult<Value> {
        let Value::Object(caller) = &request.input else {
            return Ok(request.input.clone());
        };

        let actor = self.platform.get_actor(actor_id).await?;
        let tag = request.options.build.as_deref().unwrap_or("latest");
        let build_id = actor
            .tagged_builds
            .get(tag)
            .map(|build| build.build_id.clone())
            .or_else(|| actor.latest_build_id().map(str::to_string));

        let Some(build_id) = build_id else {
            warn!(actor_id, tag, "no build found to resolve input prefills");
            return Ok(request.input.clone());
        };

        let build = self.platform.get_build(&build_id).await?;
        let mut merged = build.prefilled_input();
        for (key, value) in caller {
            merged.insert(key.clone(), value.clone());
        }
        Ok(Value::Object(merged))
    }

    /// Poll until the run leaves the in-progress set. A failed poll ends
    /// the wait instead of being retried.
    async fn wait_for_finish(&self, run_id: &str) {
        loop {
            match self.platform.get_run(run_id).await {
                Ok(run) if run.status.is_in_progress() => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
                Ok(run) => {
                    debug!(run_id, status = %run.status, "run reached terminal status");
                    break;
                }
                Err(err) => {
                    warn!(run_id, error = %err, "status poll failed, no longer waiting");
                    break;
                }
            }
        }
    }

    async fn resolved_input(&self, record: &RunRecord) -> Option<Value> {
        let store_id = &record.data.default_key_value_store_id;
        if store_id.is_empty() {
            return None;
        }
        match self.platform.get_record(store_id, INPUT_KEY).await {
            Ok(found) => found.map(|r| r.value),
            Err(err) => {
                debug!(run_id = %record.run_id, error = %err, "resolved input unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl RunInvoker for RunOrchestrator {
    async fn invoke(&self, request: RunRequest) -> EngineResult<RunResult> {
        RunOrchestrator::invoke(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MemoryStore, MockPlatform};
    use crate::domain::errors::EngineError;
    use crate::domain::models::{RunOptions, RunStatus};
    use crate::services::call_cache::CALLS_KEY;
    use serde_json::json;

    fn fast_settings() -> OrchestratorSettings {
        OrchestratorSettings {
            poll_interval: Duration::from_millis(1),
            input_settle: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn orchestrator(
        platform: Arc<MockPlatform>,
        store: Arc<MemoryStore>,
    ) -> Arc<RunOrchestrator> {
        RunOrchestrator::start(
            platform,
            store,
            Arc::new(CheckpointHub::new()),
            fast_settings(),
        )
        .await
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_platform() {
        let platform = Arc::new(MockPlatform::new());
        let orch = orchestrator(platform.clone(), Arc::new(MemoryStore::new())).await;

        let empty = orch.invoke(RunRequest::default()).await;
        assert!(matches!(empty, Err(EngineError::InvalidRequest(_))));

        let prefilled_task = RunRequest::task("a").with_options(RunOptions {
            prefilled_input: true,
            ..Default::default()
        });
        assert!(matches!(
            orch.invoke(prefilled_task).await,
            Err(EngineError::InvalidRequest(_))
        ));
        assert_eq!(platform.start_count(), 0);
    }

    #[tokio::test]
    async fn test_waits_until_terminal_status() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_status_sequence(vec![
            RunStatus::Ready,
            RunStatus::Running,
            RunStatus::Running,
            RunStatus::Succeeded,
        ]);
        let orch = orchestrator(platform.clone(), Arc::new(MemoryStore::new())).await;

        let result = orch.invoke(RunRequest::actor("X")).await.unwrap();
        assert_eq!(platform.poll_count(&result.record.run_id), 4);
        assert!(result.is_valid());
    }

    #[tokio::test]
    async fn test_poll_error_ends_wait() {
        let platform = Arc::new(MockPlatform::new());
        platform.fail_polls(true);
        let orch = orchestrator(platform.clone(), Arc::new(MemoryStore::new())).await;

        let result = orch.invoke(RunRequest::actor("X")).await.unwrap();
        assert_eq!(platform.poll_count(&result.record.run_id), 1);
    }

    #[tokio::test]
    async fn test_record_keeps_only_durable_fields_and_names() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_task("t1", "my-task", "act-for-t1");
        let orch = orchestrator(platform.clone(), Arc::new(MemoryStore::new())).await;

        let result = orch
            .invoke(RunRequest::task("t1").with_name("nightly"))
            .await
            .unwrap();

        let data = result.data();
        assert_eq!(data.task_name.as_deref(), Some("my-task"));
        assert_eq!(data.task_id.as_deref(), Some("t1"));
        assert_eq!(data.name.as_deref(), Some("nightly"));
        assert_eq!(data.actor_name, "act-for-t1-name");
        assert!(result.link().ends_with(&format!("/tasks/t1#/runs/{}", result.run_id())));
    }

    #[tokio::test]
    async fn test_prefilled_input_merges_under_caller_input() {
        let platform = Arc::new(MockPlatform::new());
        platform.set_input_schema(
            "X",
            json!({
                "properties": {
                    "maxItems": { "prefill": 5 },
                    "startUrls": { "default": ["https://example.com"] }
                }
            }),
        );
        let orch = orchestrator(platform.clone(), Arc::new(MemoryStore::new())).await;

        let request = RunRequest::actor("X")
            .with_input(json!({ "maxItems": 1 }))
            .with_options(RunOptions {
                prefilled_input: true,
                ..Default::default()
            });
        let result = orch.invoke(request).await.unwrap();

        let started = platform.started_input(result.run_id()).unwrap();
        assert_eq!(started, json!({ "maxItems": 1, "startUrls": ["https://example.com"] }));
        // the mock echoes the started input back as the INPUT record
        assert_eq!(result.input, Some(started));
    }

    #[tokio::test]
    async fn test_checkpoint_flushes_and_shutdown_deregisters() {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(CheckpointHub::new());
        let orch =
            RunOrchestrator::start(platform, store.clone(), hub.clone(), fast_settings()).await;

        assert_eq!(hub.handler_count(), 1);
        hub.fire().await;
        assert_eq!(store.get_value(CALLS_KEY).await.unwrap(), Some(json!([])));

        orch.shutdown().await.unwrap();
        assert_eq!(hub.handler_count(), 0);
    }
}
