//! Run invoker port.

use async_trait::async_trait;

use crate::domain::errors::EngineResult;
use crate::domain::models::{RunRequest, RunResult};

/// Invoke-and-wait entry point shared by test programs and matchers that
/// start auxiliary runs.
#[async_trait]
pub trait RunInvoker: Send + Sync {
    /// Start the request, or reuse the run already recorded for it, and wait
    /// for it to finish.
    async fn invoke(&self, request: RunRequest) -> EngineResult<RunResult>;
}
