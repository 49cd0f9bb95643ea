//! Engine configuration: platform access, engine timings and logging.

use serde::{Deserialize, Serialize};

/// Main configuration structure for runcheck
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Remote platform connection settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Orchestration timings and auxiliary actor ids
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlatformConfig {
    /// Base URL of the REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL used when rendering links to runs
    #[serde(default = "default_console_url")]
    pub console_url: String,

    /// API token. Falls back to the host environment and the test input.
    #[serde(default)]
    pub token: Option<String>,

    /// Client-side request budget
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.apify.com".to_string()
}

fn default_console_url() -> String {
    "https://console.apify.com".to_string()
}

const fn default_requests_per_second() -> u32 {
    30
}

const fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            console_url: default_console_url(),
            token: None,
            requests_per_second: default_requests_per_second(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Engine timings and auxiliary actors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Interval between run status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before reading a finished run's resolved input
    #[serde(default = "default_input_settle_ms")]
    pub input_settle_ms: u64,

    /// One-shot delay before the first storage read by a matcher
    #[serde(default, alias = "dataset_sleep_ms")]
    pub dataset_settle_ms: u64,

    /// How often the call cache is checkpointed while tests run
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// Root of the local key-value storage used outside the platform
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Default actor started by `withChecker`
    #[serde(default = "default_checker_actor_id")]
    pub checker_actor_id: String,

    /// Default actor started by `withDuplicates`
    #[serde(default = "default_duplicates_actor_id")]
    pub duplicates_actor_id: String,

    /// Actor that posts Slack messages
    #[serde(default = "default_slack_actor_id")]
    pub slack_actor_id: String,

    /// Actor that sends email
    #[serde(default = "default_email_actor_id")]
    pub email_actor_id: String,
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

const fn default_input_settle_ms() -> u64 {
    1_000
}

const fn default_persist_interval_secs() -> u64 {
    60
}

fn default_storage_dir() -> String {
    "./storage".to_string()
}

fn default_checker_actor_id() -> String {
    "lukaskrivka/results-checker".to_string()
}

fn default_duplicates_actor_id() -> String {
    "lukaskrivka/duplications-checker".to_string()
}

fn default_slack_actor_id() -> String {
    "katerinahronik/slack-message".to_string()
}

fn default_email_actor_id() -> String {
    "apify/send-mail".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            input_settle_ms: default_input_settle_ms(),
            dataset_settle_ms: 0,
            persist_interval_secs: default_persist_interval_secs(),
            storage_dir: default_storage_dir(),
            checker_actor_id: default_checker_actor_id(),
            duplicates_actor_id: default_duplicates_actor_id(),
            slack_actor_id: default_slack_actor_id(),
            email_actor_id: default_email_actor_id(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Also log to the terminal when a log directory is set
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

const fn default_true() -> bool {
    true
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: default_rotation(),
        }
    }
}
