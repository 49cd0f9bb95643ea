//! Process input of a test run and the host environment it runs in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Out-of-band signal a run can be started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Abort every run recorded in the referenced call cache, then exit.
    Abort,
    /// Send the timeout notification, then exit.
    Timeout,
}

const fn default_timeout_ms() -> u64 {
    600_000
}

const fn default_true() -> bool {
    true
}

/// Input record of a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunInput {
    /// Per-spec timeout in milliseconds
    #[serde(default = "default_timeout_ms", alias = "defaultTimeoutMs")]
    pub default_timeout: u64,

    /// Spec name patterns; empty runs everything
    #[serde(default)]
    pub filter: Vec<String>,

    /// Log every poll while waiting for runs
    #[serde(default = "default_true")]
    pub verbose_logs: bool,

    /// Register webhooks that abort child runs when this run dies
    #[serde(default = "default_true")]
    pub abort_runs: bool,

    /// Relaunch once, narrowed to failing specs
    #[serde(default)]
    pub retry_failed_tests: bool,

    /// Incremented by each relaunch; part of every fingerprint
    #[serde(default)]
    pub retry_epoch: u32,

    /// Declarative test program source (YAML or JSON)
    #[serde(default, alias = "testSpecSource")]
    pub test_spec: Option<String>,

    /// Shown in reports and notifications
    #[serde(default)]
    pub test_name: Option<String>,

    /// Slack bot token for failure notifications
    #[serde(default)]
    pub slack_token: Option<String>,

    /// Slack channel for failure notifications
    #[serde(default)]
    pub slack_channel: Option<String>,

    /// Address for failure notifications
    #[serde(default)]
    pub email: Option<String>,

    /// Free-form data made available to test programs
    #[serde(default)]
    pub custom_data: Value,

    /// Set on runs started by a signal webhook
    #[serde(default)]
    pub signal: Option<Signal>,

    /// Key-value store holding the calls to abort (signal runs only)
    #[serde(default)]
    pub kv: Option<String>,

    /// Run whose timeout is being reported (timeout signal only)
    #[serde(default)]
    pub source_run_id: Option<String>,

    /// Platform token, takes over from the process token
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for TestRunInput {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout_ms(),
            filter: Vec::new(),
            verbose_logs: true,
            abort_runs: true,
            retry_failed_tests: false,
            retry_epoch: 0,
            test_spec: None,
            test_name: None,
            slack_token: None,
            slack_channel: None,
            email: None,
            custom_data: Value::Null,
            signal: None,
            kv: None,
            source_run_id: None,
            token: None,
        }
    }
}

impl TestRunInput {
    /// Trimmed email address, when one that looks deliverable was given.
    pub fn email_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| email.contains('@'))
    }

    /// Slack token and channel, when both are configured.
    pub fn slack_target(&self) -> Option<(&str, &str)> {
        match (self.slack_token.as_deref(), self.slack_channel.as_deref()) {
            (Some(token), Some(channel)) if !token.is_empty() && !channel.is_empty() => {
                Some((token, channel))
            }
            _ => None,
        }
    }
}

/// Overrides handed to a relaunched process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaunchPlan {
    /// Full names of the specs that failed
    pub filter: Vec<String>,
    /// Always false, so a relaunch happens at most once
    pub retry_failed_tests: bool,
    /// Epoch of the relaunched pass
    pub retry_epoch: u32,
}

/// Facts about the process provided by the platform through `APIFY_*`
/// environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnv {
    /// Running on the platform rather than locally
    pub is_at_home: bool,
    /// Token of the platform user
    pub token: Option<String>,
    /// Actor this process runs as
    pub actor_id: Option<String>,
    /// Run this process serves
    pub actor_run_id: Option<String>,
    /// Task the run was started from
    pub actor_task_id: Option<String>,
    /// Default store of this run
    pub default_key_value_store_id: Option<String>,
}

impl HostEnv {
    /// Read the `APIFY_*` variables. Empty values count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

        Self {
            is_at_home: var("APIFY_IS_AT_HOME")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            token: var("APIFY_TOKEN"),
            actor_id: var("APIFY_ACTOR_ID"),
            actor_run_id: var("APIFY_ACTOR_RUN_ID"),
            actor_task_id: var("APIFY_ACTOR_TASK_ID"),
            default_key_value_store_id: var("APIFY_DEFAULT_KEY_VALUE_STORE_ID"),
        }
    }
}
