//! In-memory platform and state store for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::domain::errors::{EngineError, EngineResult, PlatformError, PlatformResult};
use crate::domain::models::{
    ActorInfo, ActorRun, BuildInfo, ItemsPage, KeyValueRecord, ListItemsOptions, RunOptions,
    RunStatus, RunTarget, TaggedBuild, TaskInfo, WebhookSpec,
};
use crate::domain::ports::{Platform, StateStore};

/// In-memory key-value state store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    unreadable: bool,
    writes: Mutex<usize>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose reads always fail.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Default::default()
        }
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    /// Current value of a record.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.lock().ok().and_then(|v| v.get(key).cloned())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_value(&self, key: &str) -> EngineResult<Option<Value>> {
        if self.unreadable {
            return Err(EngineError::Storage("store is unreadable".to_string()));
        }
        Ok(self.snapshot(key))
    }

    async fn set_value(&self, key: &str, value: &Value) -> EngineResult<()> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.clone());
        }
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MockRun {
    run: ActorRun,
    target_id: String,
    input: Value,
    polls: usize,
}

#[derive(Debug, Default)]
struct MockState {
    counter: u64,
    runs: HashMap<String, MockRun>,
    starts: Vec<(RunTarget, Value)>,
    default_statuses: Vec<RunStatus>,
    target_statuses: HashMap<String, Vec<RunStatus>>,
    fail_polls: bool,
    fail_starts: bool,
    tasks: HashMap<String, TaskInfo>,
    schemas: HashMap<String, Value>,
    records: HashMap<(String, String), Value>,
    seeded_records: HashMap<String, Vec<(String, Value)>>,
    seeded_datasets: HashMap<String, (Value, Vec<Value>)>,
    seeded_logs: HashMap<String, String>,
    logs: HashMap<String, String>,
    datasets: HashMap<String, (Value, Vec<Value>)>,
    queues: HashMap<String, Value>,
    webhooks: Vec<WebhookSpec>,
    aborted: Vec<String>,
}

/// Scriptable in-memory platform.
///
/// Runs are numbered `run-1`, `run-2`, ... with storages `dataset-N`,
/// `kv-N` and `queue-N`. Every run finishes `SUCCEEDED` on its first
/// poll unless a status sequence is configured. The started input is
/// stored as the run's `INPUT` record.
#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
    start_delay: Mutex<Option<Duration>>,
}

impl MockPlatform {
    /// Platform with no runs, tasks or records.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Statuses reported by successive polls of every run; the last repeats.
    pub fn set_status_sequence(&self, statuses: Vec<RunStatus>) {
        self.with_state(|s| s.default_statuses = statuses);
    }

    /// Status sequence for runs of one actor or task.
    pub fn set_target_statuses(&self, target_id: &str, statuses: Vec<RunStatus>) {
        self.with_state(|s| {
            s.target_statuses.insert(target_id.to_string(), statuses);
        });
    }

    /// Make run polls fail with a server error.
    pub fn fail_polls(&self, fail: bool) {
        self.with_state(|s| s.fail_polls = fail);
    }

    /// Make run starts fail as rejected requests.
    pub fn fail_starts(&self, fail: bool) {
        self.with_state(|s| s.fail_starts = fail);
    }

    /// Delay every start call, widening the window between cache lookup
    /// and insert.
    pub fn set_start_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.start_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Register a task of `act_id`.
    pub fn add_task(&self, task_id: &str, name: &str, act_id: &str) {
        self.with_state(|s| {
            s.tasks.insert(
                task_id.to_string(),
                TaskInfo {
                    id: task_id.to_string(),
                    name: name.to_string(),
                    act_id: act_id.to_string(),
                    input: None,
                },
            );
        });
    }

    /// Input schema of the latest build of `actor_id`.
    pub fn set_input_schema(&self, actor_id: &str, schema: Value) {
        self.with_state(|s| {
            s.schemas.insert(actor_id.to_string(), schema);
        });
    }

    /// Record written into the default key-value store of every future run
    /// of `target_id`.
    pub fn seed_record(&self, target_id: &str, key: &str, value: Value) {
        self.with_state(|s| {
            s.seeded_records
                .entry(target_id.to_string())
                .or_default()
                .push((key.to_string(), value));
        });
    }

    /// Dataset info and items of every future run of `target_id`.
    pub fn seed_dataset(&self, target_id: &str, info: Value, items: Vec<Value>) {
        self.with_state(|s| {
            s.seeded_datasets
                .insert(target_id.to_string(), (info, items));
        });
    }

    /// Log of every future run of `target_id`.
    pub fn seed_log(&self, target_id: &str, log: &str) {
        self.with_state(|s| {
            s.seeded_logs.insert(target_id.to_string(), log.to_string());
        });
    }

    /// Write a record directly into a store.
    pub fn set_record(&self, store_id: &str, key: &str, value: Value) {
        self.with_state(|s| {
            s.records
                .insert((store_id.to_string(), key.to_string()), value);
        });
    }

    /// Number of start calls so far.
    pub fn start_count(&self) -> usize {
        self.with_state(|s| s.starts.len())
    }

    /// Number of start calls that targeted `target_id`.
    pub fn starts_of(&self, target_id: &str) -> usize {
        self.with_state(|s| s.starts.iter().filter(|(t, _)| t.id() == target_id).count())
    }

    /// Input a run was started with.
    pub fn started_input(&self, run_id: &str) -> Option<Value> {
        self.with_state(|s| s.runs.get(run_id).map(|r| r.input.clone()))
    }

    /// How often a run was polled.
    pub fn poll_count(&self, run_id: &str) -> usize {
        self.with_state(|s| s.runs.get(run_id).map(|r| r.polls).unwrap_or(0))
    }

    /// Run ids passed to `abort_run`, in call order.
    pub fn aborted(&self) -> Vec<String> {
        self.with_state(|s| s.aborted.clone())
    }

    /// Webhooks registered so far.
    pub fn webhooks(&self) -> Vec<WebhookSpec> {
        self.with_state(|s| s.webhooks.clone())
    }

    fn current_status(state: &MockState, run: &MockRun) -> RunStatus {
        let sequence = state
            .target_statuses
            .get(&run.target_id)
            .unwrap_or(&state.default_statuses);
        if sequence.is_empty() {
            return RunStatus::Succeeded;
        }
        let at = run.polls.saturating_sub(1).min(sequence.len() - 1);
        sequence[at]
    }

    fn poll(&self, run_id: &str) -> PlatformResult<ActorRun> {
        self.with_state(|s| {
            let fail = s.fail_polls;
            let run = s
                .runs
                .get_mut(run_id)
                .ok_or_else(|| PlatformError::NotFound(format!("run {run_id}")))?;
            run.polls += 1;
            if fail {
                return Err(PlatformError::Status {
                    operation: "get_run",
                    status: StatusCode::BAD_GATEWAY,
                    body: "poll failed".to_string(),
                });
            }
            let snapshot = run.clone();
            let mut actor_run = snapshot.run.clone();
            actor_run.status = Self::current_status(s, &snapshot);
            Ok(actor_run)
        })
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn start_run(
        &self,
        target: &RunTarget,
        input: &Value,
        _options: &RunOptions,
    ) -> PlatformResult<ActorRun> {
        let delay = self.start_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|s| {
            if s.fail_starts {
                return Err(PlatformError::Status {
                    operation: "start_run",
                    status: StatusCode::BAD_REQUEST,
                    body: "start rejected".to_string(),
                });
            }

            s.counter += 1;
            let n = s.counter;
            let act_id = match target {
                RunTarget::Actor(id) => id.clone(),
                RunTarget::Task(id) => s
                    .tasks
                    .get(id)
                    .map(|t| t.act_id.clone())
                    .unwrap_or_else(|| id.clone()),
            };
            let run = ActorRun {
                id: format!("run-{n}"),
                act_id,
                actor_task_id: match target {
                    RunTarget::Task(id) => Some(id.clone()),
                    RunTarget::Actor(_) => None,
                },
                status: RunStatus::Ready,
                build_number: Some("0.0.1".to_string()),
                default_dataset_id: format!("dataset-{n}"),
                default_key_value_store_id: format!("kv-{n}"),
                default_request_queue_id: format!("queue-{n}"),
            };

            let target_id = target.id().to_string();
            let kv = run.default_key_value_store_id.clone();
            s.records
                .insert((kv.clone(), "INPUT".to_string()), input.clone());
            for (key, value) in s.seeded_records.get(&target_id).cloned().unwrap_or_default() {
                s.records.insert((kv.clone(), key), value);
            }

            let dataset = s
                .seeded_datasets
                .get(&target_id)
                .cloned()
                .unwrap_or_else(|| (json!({ "itemCount": 0, "cleanItemCount": 0 }), Vec::new()));
            s.datasets.insert(run.default_dataset_id.clone(), dataset);
            s.queues.insert(
                run.default_request_queue_id.clone(),
                json!({ "id": run.default_request_queue_id, "handledRequestCount": 0 }),
            );
            let log = s.seeded_logs.get(&target_id).cloned().unwrap_or_default();
            s.logs.insert(run.id.clone(), log);

            s.starts.push((target.clone(), input.clone()));
            s.runs.insert(
                run.id.clone(),
                MockRun {
                    run: run.clone(),
                    target_id,
                    input: input.clone(),
                    polls: 0,
                },
            );
            Ok(run)
        })
    }

    async fn get_run(&self, run_id: &str) -> PlatformResult<ActorRun> {
        self.poll(run_id)
    }

    async fn get_run_info(&self, run_id: &str) -> PlatformResult<Value> {
        let run = self.poll(run_id)?;
        serde_json::to_value(run).map_err(|e| PlatformError::Decode {
            operation: "get_run_info",
            message: e.to_string(),
        })
    }

    async fn abort_run(&self, run_id: &str) -> PlatformResult<()> {
        self.with_state(|s| s.aborted.push(run_id.to_string()));
        Ok(())
    }

    async fn get_log(&self, run_id: &str) -> PlatformResult<String> {
        self.with_state(|s| {
            s.logs
                .get(run_id)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("log of {run_id}")))
        })
    }

    async fn get_actor(&self, actor_id: &str) -> PlatformResult<ActorInfo> {
        self.with_state(|s| {
            let mut tagged_builds = HashMap::new();
            if s.schemas.contains_key(actor_id) {
                tagged_builds.insert(
                    "latest".to_string(),
                    TaggedBuild {
                        build_id: format!("build-{actor_id}"),
                        build_number: Some("0.0.1".to_string()),
                    },
                );
            }
            Ok(ActorInfo {
                id: actor_id.to_string(),
                name: format!("{actor_id}-name"),
                tagged_builds,
            })
        })
    }

    async fn get_task(&self, task_id: &str) -> PlatformResult<TaskInfo> {
        self.with_state(|s| {
            s.tasks
                .get(task_id)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("task {task_id}")))
        })
    }

    async fn get_build(&self, build_id: &str) -> PlatformResult<BuildInfo> {
        let actor_id = build_id.trim_start_matches("build-");
        self.with_state(|s| {
            Ok(BuildInfo {
                id: build_id.to_string(),
                build_number: Some("0.0.1".to_string()),
                input_schema: s.schemas.get(actor_id).cloned(),
            })
        })
    }

    async fn get_record(
        &self,
        store_id: &str,
        key: &str,
    ) -> PlatformResult<Option<KeyValueRecord>> {
        self.with_state(|s| {
            Ok(s.records
                .get(&(store_id.to_string(), key.to_string()))
                .map(|value| KeyValueRecord {
                    key: key.to_string(),
                    value: value.clone(),
                    content_type: Some("application/json".to_string()),
                }))
        })
    }

    async fn set_record(&self, store_id: &str, key: &str, value: &Value) -> PlatformResult<()> {
        self.set_record(store_id, key, value.clone());
        Ok(())
    }

    async fn get_dataset(&self, dataset_id: &str) -> PlatformResult<Value> {
        self.with_state(|s| {
            s.datasets
                .get(dataset_id)
                .map(|(info, _)| info.clone())
                .ok_or_else(|| PlatformError::NotFound(format!("dataset {dataset_id}")))
        })
    }

    async fn list_items(
        &self,
        dataset_id: &str,
        options: &ListItemsOptions,
    ) -> PlatformResult<ItemsPage> {
        let offset = options.0.get("offset").and_then(Value::as_u64).unwrap_or(0);
        let limit = options.0.get("limit").and_then(Value::as_u64);

        self.with_state(|s| {
            let (_, all) = s
                .datasets
                .get(dataset_id)
                .ok_or_else(|| PlatformError::NotFound(format!("dataset {dataset_id}")))?;
            let items: Vec<Value> = all
                .iter()
                .skip(offset as usize)
                .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
                .cloned()
                .collect();
            Ok(ItemsPage {
                total: all.len() as u64,
                offset,
                count: items.len() as u64,
                limit: limit.unwrap_or(all.len() as u64),
                items,
            })
        })
    }

    async fn get_request_queue(&self, queue_id: &str) -> PlatformResult<Value> {
        self.with_state(|s| {
            s.queues
                .get(queue_id)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("request queue {queue_id}")))
        })
    }

    async fn create_webhook(&self, webhook: &WebhookSpec) -> PlatformResult<()> {
        self.with_state(|s| s.webhooks.push(webhook.clone()));
        Ok(())
    }
}
