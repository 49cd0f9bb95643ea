//! `runcheck run`: execute a test pass, or handle a signal run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::connect;
use super::summary::ReportOutput;
use crate::adapters::{NotifyTargets, PlatformNotifier, PlatformStore, ProcessRelauncher};
use crate::application::{
    abort_recorded_runs, checkpoint_on_shutdown, notify_timeout, register_signal_webhooks,
    signal_webhooks, SessionDeps, TestSession, DEFAULT_TEST_NAME,
};
use crate::cli::output::{output, CommandOutput};
use crate::domain::errors::EngineError;
use crate::domain::models::{Config, HostEnv, Signal, TestRunInput};
use crate::domain::ports::StateStore;
use crate::harness::DeclarativeLoader;
use crate::infrastructure::config::{ConfigLoader, InputOverrides, InputSources};
use crate::services::{CheckpointHub, Decision, NotificationContext};

/// Record holding the input of a run.
const INPUT_KEY: &str = "INPUT";

/// Run a test program, or handle an abort/timeout signal input
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Read the test input from a JSON or YAML file instead of the INPUT record
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Only run specs whose full name matches (repeatable, regex)
    #[arg(short, long)]
    pub filter: Vec<String>,

    /// Name shown in reports and notifications
    #[arg(long)]
    pub test_name: Option<String>,

    /// Per-spec timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Relaunch once with only the failing specs
    #[arg(long)]
    pub retry_failed_tests: bool,

    /// Log less while waiting for runs
    #[arg(short, long)]
    pub quiet: bool,

    /// Platform API token
    #[arg(long, env = "RUNCHECK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl RunArgs {
    fn overrides(&self) -> InputOverrides {
        InputOverrides {
            filter: (!self.filter.is_empty()).then(|| self.filter.clone()),
            test_name: self.test_name.clone(),
            default_timeout: self.timeout_ms,
            retry_failed_tests: self.retry_failed_tests.then_some(true),
            verbose_logs: self.quiet.then_some(false),
            token: None,
        }
    }
}

/// Result of a signal run.
#[derive(Debug, Serialize)]
pub struct SignalOutput {
    /// `abort` or `timeout`
    pub signal: String,
    /// What was done
    pub message: String,
}

impl CommandOutput for SignalOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run `runcheck run`.
///
/// A signal input is handled and the command returns. Otherwise one test
/// pass runs; a relaunch replaces the process and does not return here.
pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let host = HostEnv::from_env();
    let (platform, store) = connect(config, &host, args.token.clone())?;

    let record = if args.input.is_none() {
        store
            .get_value(INPUT_KEY)
            .await
            .context("Failed to read the INPUT record")?
    } else {
        None
    };
    let input = ConfigLoader::load_input(&InputSources {
        record,
        file: args.input.clone(),
        relaunch: ConfigLoader::relaunch_from_env()?,
        overrides: args.overrides(),
    })?;

    // a token in the input takes over from the process token
    let token = input
        .token
        .clone()
        .or(args.token)
        .or_else(|| config.platform.token.clone())
        .or_else(|| host.token.clone());
    let (platform, store) = match input.token.clone() {
        Some(input_token) => connect(config, &host, Some(input_token))?,
        None => (platform, store),
    };

    match input.signal {
        Some(Signal::Abort) => {
            let kv = input
                .kv
                .clone()
                .ok_or_else(|| EngineError::Usage("abort signal requires \"kv\"".to_string()))?;
            let calls = PlatformStore::new(platform.clone(), kv.clone());
            let aborted = abort_recorded_runs(platform.as_ref(), &calls).await?;
            output(
                &SignalOutput {
                    signal: "abort".to_string(),
                    message: format!("Aborted {aborted} run(s) recorded in store {kv}"),
                },
                json_mode,
            );
            return Ok(());
        }
        Some(Signal::Timeout) => {
            send_timeout_notice(config, &input, platform).await;
            output(
                &SignalOutput {
                    signal: "timeout".to_string(),
                    message: "Timeout notification sent".to_string(),
                },
                json_mode,
            );
            return Ok(());
        }
        None => {}
    }

    if host.is_at_home && input.abort_runs {
        let webhooks = signal_webhooks(&host, &input, &config.platform.api_base_url, token.as_deref());
        let registered = register_signal_webhooks(platform.as_ref(), &webhooks).await;
        info!(registered, "signal webhooks registered");
    }

    let checkpoints = Arc::new(CheckpointHub::new());
    let mut shutdown_listener = checkpoint_on_shutdown(Arc::clone(&checkpoints));
    let deps = SessionDeps {
        platform: platform.clone(),
        store: Arc::clone(&store),
        notifier: Arc::new(PlatformNotifier::new(
            platform.clone(),
            NotifyTargets::from_input(&input),
            &config.engine,
        )),
        relauncher: Arc::new(ProcessRelauncher::current()?),
        loader: Arc::new(DeclarativeLoader::new()),
        checkpoints,
    };

    let session = TestSession::new(config.clone(), input, host, deps);
    let outcome = tokio::select! {
        outcome = session.execute() => {
            shutdown_listener.abort();
            outcome?
        }
        received = &mut shutdown_listener => {
            let received = received.context("Shutdown listener failed")?;
            return Err(EngineError::Interrupted {
                signal: received.as_str(),
                exit_code: received.exit_code(),
            }
            .into());
        }
    };

    let label = match &outcome.decision {
        Decision::Success => "success",
        Decision::Failure { .. } => "failure",
        Decision::Relaunch(_) => "relaunch",
    };
    output(
        &ReportOutput::new(&outcome.tree, &outcome.summary).with_outcome(label),
        json_mode,
    );

    outcome.decision.into_result()?;
    Ok(())
}

async fn send_timeout_notice(
    config: &Config,
    input: &TestRunInput,
    platform: Arc<crate::adapters::ApifyPlatform>,
) {
    let test_name = input
        .test_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_TEST_NAME.to_string());

    let mut ctx = NotificationContext::new(test_name);
    if let Some(run_id) = input.source_run_id.as_deref() {
        ctx = ctx.with_run(&config.platform.console_url, run_id);
    }
    if let Some(kv) = input.kv.as_deref() {
        ctx = ctx.with_output(&config.platform.api_base_url, kv);
    }

    let notifier = PlatformNotifier::new(platform, NotifyTargets::from_input(input), &config.engine);
    notify_timeout(&notifier, &ctx).await;
}
