//! State store backed by a key-value store on the remote platform.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::EngineResult;
use crate::domain::ports::{Platform, StateStore};

/// [`StateStore`] over one remote key-value store.
pub struct PlatformStore {
    platform: Arc<dyn Platform>,
    store_id: String,
}

impl PlatformStore {
    /// Store backed by `store_id`.
    pub fn new(platform: Arc<dyn Platform>, store_id: impl Into<String>) -> Self {
        Self {
            platform,
            store_id: store_id.into(),
        }
    }

    /// Id of the backing store.
    pub fn store_id(&self) -> &str {
        &self.store_id
    }
}

#[async_trait]
impl StateStore for PlatformStore {
    async fn get_value(&self, key: &str) -> EngineResult<Option<Value>> {
        let record = self.platform.get_record(&self.store_id, key).await?;
        Ok(record.map(|r| r.value))
    }

    async fn set_value(&self, key: &str, value: &Value) -> EngineResult<()> {
        self.platform.set_record(&self.store_id, key, value).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockPlatform;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_and_writes_through_the_platform() {
        let platform = Arc::new(MockPlatform::new());
        let store = PlatformStore::new(platform.clone(), "kv-own");

        assert_eq!(store.get_value("CALLS").await.unwrap(), None);
        store.set_value("CALLS", &json!([["f", {}]])).await.unwrap();

        let record = platform.get_record("kv-own", "CALLS").await.unwrap().unwrap();
        assert_eq!(record.value, json!([["f", {}]]));
        assert_eq!(store.get_value("CALLS").await.unwrap(), Some(json!([["f", {}]])));
    }
}
