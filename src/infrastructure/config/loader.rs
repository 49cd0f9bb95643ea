//! Layered loading of the engine configuration and the test input.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Yaml};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use crate::adapters::relauncher::RELAUNCH_ENV;
use crate::domain::models::{Config, RelaunchPlan, TestRunInput};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unknown log level
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown log format
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown rotation policy
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// A URL setting is not http(s)
    #[error("Invalid {0}: {1}. Must be an http(s) URL")]
    InvalidUrl(&'static str, String),

    /// Zero requests per second
    #[error("Invalid requests_per_second: {0}. Must be at least 1")]
    InvalidRateLimit(u32),

    /// A timing setting is zero
    #[error("Invalid {0}: must be greater than 0")]
    ZeroDuration(&'static str),

    /// An auxiliary actor id is blank
    #[error("Auxiliary actor id for {0} cannot be empty")]
    EmptyActorId(&'static str),

    /// The `--input` file does not exist
    #[error("Input file not found: {0}")]
    MissingInputFile(PathBuf),

    /// The merged input does not decode
    #[error("Invalid test input: {0}")]
    InvalidInput(String),

    /// The relaunch plan in the environment does not decode
    #[error("Invalid RUNCHECK_RELAUNCH value: {0}")]
    InvalidRelaunch(String),
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputOverrides {
    /// `--filter`, replaces the input filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<String>>,
    /// `--test-name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    /// `--timeout-ms`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<u64>,
    /// `--retry-failed-tests`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_failed_tests: Option<bool>,
    /// `--quiet` sets this to false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_logs: Option<bool>,
    /// Platform token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Where a test input is assembled from, lowest precedence first.
#[derive(Debug, Clone, Default)]
pub struct InputSources {
    /// `INPUT` record of this run
    pub record: Option<Value>,
    /// `--input` file (JSON or YAML); takes the place of the record
    pub file: Option<PathBuf>,
    /// Command line flags
    pub overrides: InputOverrides,
    /// Plan left by the previous process when this one was relaunched
    pub relaunch: Option<RelaunchPlan>,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the working directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .runcheck/config.yaml
    /// 3. .runcheck/local.yaml (optional local overrides)
    /// 4. Environment variables (RUNCHECK_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`] with the `.runcheck` directory
    /// resolved against `base`.
    pub fn load_from(base: &Path) -> Result<Config> {
        let dir = base.join(".runcheck");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("RUNCHECK_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        for (name, url) in [
            ("api_base_url", &config.platform.api_base_url),
            ("console_url", &config.platform.console_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(name, url.clone()));
            }
        }

        if config.platform.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(config.platform.requests_per_second));
        }
        if config.platform.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("request_timeout_secs"));
        }
        if config.engine.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("poll_interval_ms"));
        }

        for (name, id) in [
            ("checker", &config.engine.checker_actor_id),
            ("duplicates", &config.engine.duplicates_actor_id),
            ("slack", &config.engine.slack_actor_id),
            ("email", &config.engine.email_actor_id),
        ] {
            if id.trim().is_empty() {
                return Err(ConfigError::EmptyActorId(name));
            }
        }

        Ok(())
    }

    /// Assemble the test input.
    ///
    /// Layers: the `INPUT` record or the `--input` file, then command line
    /// overrides, then the relaunch plan. A relaunched process sees its
    /// original arguments again, so the plan has the last word on
    /// `filter`, `retryFailedTests` and `retryEpoch`. Missing fields take
    /// the documented input defaults.
    pub fn load_input(sources: &InputSources) -> Result<TestRunInput, ConfigError> {
        let mut figment = Figment::new();

        if let Some(path) = &sources.file {
            if !path.is_file() {
                return Err(ConfigError::MissingInputFile(path.clone()));
            }
            let is_json = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            figment = if is_json {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Yaml::file(path))
            };
        } else if let Some(Value::Object(record)) = &sources.record {
            figment = figment.merge(Serialized::defaults(canonical_keys(record.clone())));
        }

        figment = figment.merge(Serialized::defaults(&sources.overrides));
        if let Some(plan) = &sources.relaunch {
            figment = figment.merge(Serialized::defaults(plan));
        }

        figment
            .extract()
            .map_err(|e| ConfigError::InvalidInput(e.to_string()))
    }

    /// Relaunch plan handed over by the previous pass, if any.
    pub fn relaunch_from_env() -> Result<Option<RelaunchPlan>, ConfigError> {
        match std::env::var(RELAUNCH_ENV) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| ConfigError::InvalidRelaunch(e.to_string())),
            _ => Ok(None),
        }
    }
}

/// Rename legacy input keys so they merge with their current names.
fn canonical_keys(mut record: serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    for (legacy, current) in [
        ("defaultTimeoutMs", "defaultTimeout"),
        ("testSpecSource", "testSpec"),
    ] {
        if let Some(value) = record.remove(legacy) {
            record.entry(current).or_insert(value);
        }
    }
    record.retain(|_, value| !value.is_null());
    record
}
