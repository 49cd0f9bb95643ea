//! State store port - named records that survive a process restart.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::EngineResult;

/// JSON records keyed by name.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a record. Missing records are `Ok(None)`.
    async fn get_value(&self, key: &str) -> EngineResult<Option<Value>>;

    /// Write a record, replacing any previous value.
    async fn set_value(&self, key: &str, value: &Value) -> EngineResult<()>;
}
