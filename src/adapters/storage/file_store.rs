//! State store backed by JSON files, one per key.
//!
//! Uses the same layout as local platform storage:
//! `<storage_dir>/key_value_stores/<store>/<KEY>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::ports::StateStore;

/// Name of the store used when none is given.
pub const DEFAULT_STORE: &str = "default";

/// Key-value store kept as one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Named store under a storage root.
    pub fn in_storage(storage_dir: impl AsRef<Path>, store: &str) -> Self {
        Self::new(storage_dir.as_ref().join("key_value_stores").join(store))
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> EngineResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(EngineError::Storage(format!("invalid record key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get_value(&self, key: &str) -> EngineResult<Option<Value>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set_value(&self, key: &str, value: &Value) -> EngineResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await?;

        // never leave a truncated record behind
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "wrote record");
        Ok(())
    }
}
