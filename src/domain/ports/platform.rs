//! Platform port - interface to the remote execution service.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::PlatformResult;
use crate::domain::models::{
    ActorInfo, ActorRun, BuildInfo, ItemsPage, KeyValueRecord, ListItemsOptions, RunOptions,
    RunTarget, TaskInfo, WebhookSpec,
};

/// Operations the engine consumes from the remote platform.
///
/// Implementations must not block in `start_run` until the run finishes;
/// waiting is the orchestrator's job.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Start a run of an actor or task and return immediately.
    async fn start_run(
        &self,
        target: &RunTarget,
        input: &Value,
        options: &RunOptions,
    ) -> PlatformResult<ActorRun>;

    /// Fetch the live state of a run.
    async fn get_run(&self, run_id: &str) -> PlatformResult<ActorRun>;

    /// Fetch the live run as raw metadata, for assertions.
    async fn get_run_info(&self, run_id: &str) -> PlatformResult<Value>;

    /// Ask the platform to abort a run.
    async fn abort_run(&self, run_id: &str) -> PlatformResult<()>;

    /// Full log of a run.
    async fn get_log(&self, run_id: &str) -> PlatformResult<String>;

    /// Actor metadata, including tagged builds.
    async fn get_actor(&self, actor_id: &str) -> PlatformResult<ActorInfo>;

    /// Saved task, including its input.
    async fn get_task(&self, task_id: &str) -> PlatformResult<TaskInfo>;

    /// Build metadata, including the input schema.
    async fn get_build(&self, build_id: &str) -> PlatformResult<BuildInfo>;

    /// Read a key-value store record. `None` when the key does not exist.
    async fn get_record(&self, store_id: &str, key: &str)
        -> PlatformResult<Option<KeyValueRecord>>;

    /// Write a JSON record to a key-value store.
    async fn set_record(&self, store_id: &str, key: &str, value: &Value) -> PlatformResult<()>;

    /// Dataset metadata, such as `itemCount` and `cleanItemCount`.
    async fn get_dataset(&self, dataset_id: &str) -> PlatformResult<Value>;

    /// One page of dataset items.
    async fn list_items(
        &self,
        dataset_id: &str,
        options: &ListItemsOptions,
    ) -> PlatformResult<ItemsPage>;

    /// Request queue metadata.
    async fn get_request_queue(&self, queue_id: &str) -> PlatformResult<Value>;

    /// Register an ad-hoc webhook.
    async fn create_webhook(&self, webhook: &WebhookSpec) -> PlatformResult<()>;
}
