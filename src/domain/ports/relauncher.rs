//! Relauncher port - restarts the test process with narrowed scope.

use async_trait::async_trait;

use crate::domain::errors::EngineResult;
use crate::domain::models::RelaunchPlan;

/// Starts the retry pass.
#[async_trait]
pub trait Relauncher: Send + Sync {
    /// Replace the current pass with a fresh one. A process-level
    /// implementation does not return on success.
    async fn relaunch(&self, plan: &RelaunchPlan) -> EngineResult<()>;
}
