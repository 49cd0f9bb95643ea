//! CLI command implementations.

pub mod abort;
pub mod run;
pub mod summary;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::storage::file_store::DEFAULT_STORE;
use crate::adapters::{ApifyClientConfig, ApifyPlatform, FileStore, PlatformStore};
use crate::domain::models::{Config, HostEnv};
use crate::domain::ports::StateStore;

/// Platform client plus the default store of this run: the platform store
/// when running on the platform, the local file store otherwise.
pub(crate) fn connect(
    config: &Config,
    host: &HostEnv,
    token: Option<String>,
) -> Result<(Arc<ApifyPlatform>, Arc<dyn StateStore>)> {
    let token = token.or_else(|| config.platform.token.clone()).or_else(|| host.token.clone());
    let platform = Arc::new(
        ApifyPlatform::with_config(ApifyClientConfig::from_platform_config(&config.platform, token))
            .context("Failed to create the platform client")?,
    );

    let store: Arc<dyn StateStore> = match (host.is_at_home, host.default_key_value_store_id.as_deref()) {
        (true, Some(store_id)) => Arc::new(PlatformStore::new(platform.clone(), store_id)),
        _ => Arc::new(FileStore::in_storage(&config.engine.storage_dir, DEFAULT_STORE)),
    };
    Ok((platform, store))
}
