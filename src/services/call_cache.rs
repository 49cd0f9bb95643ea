//! Fingerprint-keyed cache of run invocations.
//!
//! Persisted as the `CALLS` record: an array of `[fingerprint, record]`
//! pairs in insertion order. The cache never persists on its own; the
//! orchestrator calls [`CallCache::flush`] after each mutation, on every
//! checkpoint and after each wait.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::EngineResult;
use crate::domain::models::{Fingerprint, RunRecord};
use crate::domain::ports::StateStore;

/// Record key holding the serialized cache.
pub const CALLS_KEY: &str = "CALLS";

/// Insertion-ordered map from fingerprint to run record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallCache {
    records: Vec<RunRecord>,
    index: HashMap<Fingerprint, usize>,
}

impl CallCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache from persisted storage.
    ///
    /// Missing, unreadable or malformed state yields an empty cache.
    pub async fn load(store: &dyn StateStore) -> Self {
        match store.get_value(CALLS_KEY).await {
            Ok(Some(value)) => match Self::from_value(value) {
                Ok(cache) => {
                    debug!(entries = cache.len(), "loaded call cache");
                    cache
                }
                Err(err) => {
                    warn!(error = %err, "ignoring malformed call cache");
                    Self::new()
                }
            },
            Ok(None) => Self::new(),
            Err(err) => {
                warn!(error = %err, "call cache unreadable, starting empty");
                Self::new()
            }
        }
    }

    /// Persist the current entries.
    pub async fn flush(&self, store: &dyn StateStore) -> EngineResult<()> {
        store.set_value(CALLS_KEY, &self.to_value()?).await
    }

    /// Decode the persisted `[fingerprint, record]` pairs. `null` decodes
    /// to an empty cache.
    pub fn from_value(value: Value) -> EngineResult<Self> {
        if value.is_null() {
            return Ok(Self::new());
        }
        let pairs: Vec<(Fingerprint, RunRecord)> = serde_json::from_value(value)?;
        let mut cache = Self::new();
        for (fingerprint, mut record) in pairs {
            record.fingerprint = fingerprint;
            cache.insert(record);
        }
        Ok(cache)
    }

    /// Encode the entries as `[fingerprint, record]` pairs in insertion
    /// order.
    pub fn to_value(&self) -> EngineResult<Value> {
        let pairs = self
            .records
            .iter()
            .map(|record| -> EngineResult<Value> {
                Ok(Value::Array(vec![
                    Value::String(record.fingerprint.as_str().to_string()),
                    serde_json::to_value(record)?,
                ]))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Value::Array(pairs))
    }

    /// Record stored for `fingerprint`.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RunRecord> {
        self.index.get(fingerprint).map(|&at| &self.records[at])
    }

    /// True when a run was already recorded for `fingerprint`.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.index.contains_key(fingerprint)
    }

    /// Insert a record. The first record for a fingerprint wins; returns
    /// false when the fingerprint was already present.
    pub fn insert(&mut self, record: RunRecord) -> bool {
        if self.index.contains_key(&record.fingerprint) {
            return false;
        }
        self.index
            .insert(record.fingerprint.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Number of recorded runs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.records.iter()
    }

    /// Ids of every recorded run, in insertion order.
    pub fn run_ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.run_id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MemoryStore;
    use crate::domain::models::RunData;
    use serde_json::json;

    fn record(fp: &str, run_id: &str) -> RunRecord {
        RunRecord {
            fingerprint: Fingerprint::new(fp),
            run_id: run_id.to_string(),
            data: RunData {
                act_id: "act".to_string(),
                actor_name: "actor".to_string(),
                build_number: "0.0.1".to_string(),
                default_key_value_store_id: format!("kv-{run_id}"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_first_insert_wins_and_order_is_kept() {
        let mut cache = CallCache::new();
        assert!(cache.insert(record("b", "run-b")));
        assert!(cache.insert(record("a", "run-a")));
        assert!(!cache.insert(record("b", "other")));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&Fingerprint::new("b")).unwrap().run_id, "run-b");
        assert_eq!(cache.run_ids(), vec!["run-b", "run-a"]);
    }

    #[tokio::test]
    async fn test_flush_and_load_round_trip() {
        let store = MemoryStore::new();
        let mut cache = CallCache::new();
        cache.insert(record("f1", "r1"));
        cache.insert(record("f2", "r2"));
        cache.flush(&store).await.unwrap();

        let loaded = CallCache::load(&store).await;
        assert_eq!(loaded, cache);

        let raw = store.get_value(CALLS_KEY).await.unwrap().unwrap();
        assert_eq!(raw[0][0], json!("f1"));
        assert_eq!(raw[1][1]["runId"], json!("r2"));
    }

    #[test]
    fn test_encoded_pairs_decode_back() {
        let mut cache = CallCache::new();
        cache.insert(record("f1", "r1"));

        let value = cache.to_value().unwrap();
        let pairs = value.as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0][1].is_object());
        assert_eq!(CallCache::from_value(value).unwrap(), cache);
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_and_malformed_state() {
        let store = MemoryStore::new();
        assert!(CallCache::load(&store).await.is_empty());

        store.set_value(CALLS_KEY, &json!({ "not": "pairs" })).await.unwrap();
        assert!(CallCache::load(&store).await.is_empty());

        store.set_value(CALLS_KEY, &Value::Null).await.unwrap();
        assert!(CallCache::load(&store).await.is_empty());
    }
}
