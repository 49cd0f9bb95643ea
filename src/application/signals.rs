//! Out-of-band signal handling.
//!
//! A test run that dies on the platform cannot clean up after itself, so
//! at start it registers webhooks that launch a fresh run of the same
//! actor with a `signal` input. The abort signal aborts every run recorded
//! in the dead run's call cache; the timeout signal sends one notification.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::errors::EngineResult;
use crate::domain::models::{HostEnv, TestRunInput, WebhookSpec};
use crate::domain::ports::{Notifier, Platform, StateStore};
use crate::services::{timeout_notification, CallCache, CheckpointHub, NotificationContext, CALLS_KEY};

const ABORT_EVENTS: [&str; 2] = ["ACTOR.RUN.ABORTED", "ACTOR.RUN.TIMED_OUT"];
const TIMEOUT_EVENTS: [&str; 1] = ["ACTOR.RUN.TIMED_OUT"];

/// Abort every run recorded in the call cache held by `store`.
///
/// Returns the number of abort requests the platform accepted. A failed
/// abort is logged and the remaining runs are still aborted.
pub async fn abort_recorded_runs(platform: &dyn Platform, store: &dyn StateStore) -> EngineResult<usize> {
    let Some(raw) = store.get_value(CALLS_KEY).await? else {
        info!("No recorded calls to abort");
        return Ok(0);
    };
    let calls = CallCache::from_value(raw)?;

    let mut aborted = 0;
    for run_id in calls.run_ids() {
        info!(run_id = %run_id, "Aborting run {run_id}");
        match platform.abort_run(&run_id).await {
            Ok(()) => aborted += 1,
            Err(err) => warn!(run_id = %run_id, error = %err, "abort failed"),
        }
    }
    Ok(aborted)
}

/// Deliver the one-shot timeout notification.
pub async fn notify_timeout(notifier: &dyn Notifier, ctx: &NotificationContext) {
    info!(test_name = %ctx.test_name, "reporting timed out test run");
    notifier.notify(&timeout_notification(ctx)).await;
}

/// Webhooks that relaunch this actor with a signal when this run dies.
///
/// Empty when the host does not identify the run, the actor or its
/// default store, or when no token is available to authenticate the
/// relaunch.
pub fn signal_webhooks(
    host: &HostEnv,
    input: &TestRunInput,
    api_base_url: &str,
    token: Option<&str>,
) -> Vec<WebhookSpec> {
    let (Some(run_id), Some(actor_id), Some(kv), Some(token)) = (
        host.actor_run_id.as_deref(),
        host.actor_id.as_deref(),
        host.default_key_value_store_id.as_deref(),
        token,
    ) else {
        return Vec::new();
    };

    let request_url = format!(
        "{}/v2/acts/{actor_id}/runs?token={token}",
        api_base_url.trim_end_matches('/')
    );

    let abort = json!({ "signal": "abort", "token": token, "kv": kv });
    let timeout = json!({
        "signal": "timeout",
        "token": token,
        "kv": kv,
        "sourceRunId": run_id,
        "testName": input.test_name,
        "slackToken": input.slack_token,
        "slackChannel": input.slack_channel,
        "email": input.email,
    });

    vec![
        WebhookSpec {
            event_types: ABORT_EVENTS.iter().map(|e| e.to_string()).collect(),
            request_url: request_url.clone(),
            idempotency_key: format!("{run_id}-abort"),
            payload_template: abort.to_string(),
            actor_run_id: run_id.to_string(),
        },
        WebhookSpec {
            event_types: TIMEOUT_EVENTS.iter().map(|e| e.to_string()).collect(),
            request_url,
            idempotency_key: format!("{run_id}-timeout"),
            payload_template: timeout.to_string(),
            actor_run_id: run_id.to_string(),
        },
    ]
}

/// Register the signal webhooks. Registration failures are logged.
pub async fn register_signal_webhooks(platform: &dyn Platform, webhooks: &[WebhookSpec]) -> usize {
    let mut registered = 0;
    for webhook in webhooks {
        match platform.create_webhook(webhook).await {
            Ok(()) => registered += 1,
            Err(err) => warn!(
                events = ?webhook.event_types,
                error = %err,
                "could not register signal webhook"
            ),
        }
    }
    registered
}

/// Why the process was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or ctrl-c.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl ShutdownSignal {
    /// Conventional shell exit status, 128 plus the signal number.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }

    /// Signal name for logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// Fire the checkpoint hub once when the process is asked to stop.
///
/// The returned task finishes with the signal after the checkpoint, so the
/// caller can stop the pass and exit. Handlers are installed before this
/// returns. When they cannot be installed the task never finishes.
#[cfg(unix)]
pub fn checkpoint_on_shutdown(hub: Arc<CheckpointHub>) -> JoinHandle<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = signal(SignalKind::terminate())
        .and_then(|terminate| Ok((terminate, signal(SignalKind::interrupt())?)));
    tokio::spawn(async move {
        let (mut terminate, mut interrupt) = match streams {
            Ok(streams) => streams,
            Err(err) => {
                warn!(error = %err, "signal handlers unavailable, checkpoints limited to the interval");
                return std::future::pending().await;
            }
        };
        let received = tokio::select! {
            _ = terminate.recv() => ShutdownSignal::Terminate,
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
        };
        info!(signal = received.as_str(), "shutdown requested, persisting state");
        hub.fire().await;
        received
    })
}

/// Fire the checkpoint hub once when the process is asked to stop.
#[cfg(not(unix))]
pub fn checkpoint_on_shutdown(hub: Arc<CheckpointHub>) -> JoinHandle<ShutdownSignal> {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "interrupt handler unavailable, checkpoints limited to the interval");
            return std::future::pending().await;
        }
        info!(signal = "ctrl-c", "shutdown requested, persisting state");
        hub.fire().await;
        ShutdownSignal::Interrupt
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MemoryStore, MockPlatform};
    use serde_json::Value;

    fn host() -> HostEnv {
        HostEnv {
            is_at_home: true,
            token: Some("tok".to_string()),
            actor_id: Some("act1".to_string()),
            actor_run_id: Some("run1".to_string()),
            actor_task_id: None,
            default_key_value_store_id: Some("kv1".to_string()),
        }
    }

    #[test]
    fn test_signal_webhooks_target_this_actor() {
        let input = TestRunInput {
            test_name: Some("Nightly".to_string()),
            ..Default::default()
        };
        let hooks = signal_webhooks(&host(), &input, "https://api.apify.com/", Some("tok"));

        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].request_url, "https://api.apify.com/v2/acts/act1/runs?token=tok");
        assert_eq!(hooks[0].event_types, vec!["ACTOR.RUN.ABORTED", "ACTOR.RUN.TIMED_OUT"]);
        assert_eq!(hooks[0].actor_run_id, "run1");
        assert_ne!(hooks[0].idempotency_key, hooks[1].idempotency_key);

        let abort: Value = serde_json::from_str(&hooks[0].payload_template).unwrap();
        assert_eq!(abort["signal"], "abort");
        assert_eq!(abort["kv"], "kv1");

        let timeout: TestRunInput = serde_json::from_str(&hooks[1].payload_template).unwrap();
        assert_eq!(timeout.source_run_id.as_deref(), Some("run1"));
        assert_eq!(timeout.test_name.as_deref(), Some("Nightly"));
    }

    #[test]
    fn test_signal_webhooks_need_host_identity() {
        let mut host = host();
        host.actor_run_id = None;
        assert!(signal_webhooks(&host, &TestRunInput::default(), "https://api", Some("t")).is_empty());
        assert!(signal_webhooks(&self::host(), &TestRunInput::default(), "https://api", None).is_empty());
    }

    #[tokio::test]
    async fn test_abort_recorded_runs_without_calls() {
        let platform = MockPlatform::new();
        let store = MemoryStore::new();
        assert_eq!(abort_recorded_runs(&platform, &store).await.unwrap(), 0);
        assert!(platform.aborted().is_empty());
    }

    #[test]
    fn test_shutdown_exit_codes() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 143);
        assert_eq!(ShutdownSignal::Terminate.as_str(), "SIGTERM");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_checkpoints_once_and_stops_listening() {
        use crate::services::CheckpointHandler;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        struct Counter(AtomicUsize);

        #[async_trait]
        impl CheckpointHandler for Counter {
            async fn on_checkpoint(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let hub = Arc::new(CheckpointHub::new());
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        hub.register(counter.clone());

        let listener = checkpoint_on_shutdown(Arc::clone(&hub));
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), listener)
            .await
            .expect("listener should finish after the signal")
            .unwrap();
        assert_eq!(received, ShutdownSignal::Terminate);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
