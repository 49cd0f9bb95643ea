//! `runcheck abort`: abort every run recorded in a store's call cache.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::connect;
use crate::adapters::PlatformStore;
use crate::application::abort_recorded_runs;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, HostEnv};

/// Abort every run recorded in a key-value store's CALLS record
#[derive(Args, Debug)]
pub struct AbortArgs {
    /// Key-value store holding the CALLS record
    #[arg(long)]
    pub store: String,

    /// Platform API token
    #[arg(long, env = "RUNCHECK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Result of `runcheck abort`.
#[derive(Debug, Serialize)]
pub struct AbortOutput {
    /// Store the calls were read from
    pub store: String,
    /// Runs the platform agreed to abort
    pub aborted: usize,
}

impl CommandOutput for AbortOutput {
    fn to_human(&self) -> String {
        format!("Aborted {} run(s) recorded in store {}", self.aborted, self.store)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run `runcheck abort`.
pub async fn execute(args: AbortArgs, config: &Config, json_mode: bool) -> Result<()> {
    let host = HostEnv::from_env();
    let (platform, _) = connect(config, &host, args.token)?;
    let calls = PlatformStore::new(platform.clone(), args.store.clone());
    let aborted = abort_recorded_runs(platform.as_ref(), &calls).await?;

    output(
        &AbortOutput {
            store: args.store,
            aborted,
        },
        json_mode,
    );
    Ok(())
}
