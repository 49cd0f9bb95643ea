//! Run requests, the durable records kept for them and the enriched results
//! handed to assertions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::errors::{EngineError, EngineResult};

/// Input fields commonly used by actors to cap how much they scrape.
const MAX_RESULT_FIELDS: &[&str] = &[
    "maxItems",
    "maxResults",
    "maxRequestsPerCrawl",
    "maxPagesPerCrawl",
    "maxPosts",
    "maxReviews",
    "maxComments",
    "resultsLimit",
];

/// Longest rendering of the resolved input included in failure messages.
const MAX_INPUT_CHARS: usize = 1_000;

/// Deterministic hash of a run request, used as the deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed hash.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty fingerprint marks a result as unusable.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Platform options forwarded when starting a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Build tag or number to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    /// Memory limit in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mbytes: Option<u32>,

    /// Run timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Merge the actor's declared input prefills before starting.
    /// Only valid for direct actor invocations.
    #[serde(default, skip_serializing_if = "is_false")]
    pub prefilled_input: bool,
}

/// What a run request points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Actor id or `user/name`
    Actor(String),
    /// Task id or `user~name`
    Task(String),
}

impl RunTarget {
    /// Id of the target, whichever kind it is.
    pub fn id(&self) -> &str {
        match self {
            RunTarget::Actor(id) | RunTarget::Task(id) => id,
        }
    }

    /// True for task targets.
    pub fn is_task(&self) -> bool {
        matches!(self, RunTarget::Task(_))
    }
}

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTarget::Actor(id) => write!(f, "actor {id}"),
            RunTarget::Task(id) => write!(f, "task {id}"),
        }
    }
}

/// A request to run an actor or a task.
///
/// Field order matters: the fingerprint is computed over the serialized
/// request, and `serde_json` emits struct fields in declaration order and
/// object keys of `input` sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Task to run. Exclusive with `actor_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    /// Actor to run. Exclusive with `task_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    /// Run input, an object
    #[serde(default = "empty_object")]
    pub input: Value,

    /// Platform start options
    #[serde(default)]
    pub options: RunOptions,

    /// Caller supplied label shown in failure messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Forces a distinct fingerprint for otherwise identical requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            task_id: None,
            actor_id: None,
            input: empty_object(),
            options: RunOptions::default(),
            name: None,
            nonce: None,
        }
    }
}

impl RunRequest {
    /// Request for an actor run with an empty input.
    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Default::default()
        }
    }

    /// Request for a task run with an empty input.
    pub fn task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }

    /// Replace the run input.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Replace the start options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Label the run in failure messages.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Make the request distinct from otherwise identical ones.
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Validate the request and resolve what it targets.
    pub fn target(&self) -> EngineResult<RunTarget> {
        let task = self.task_id.as_deref().filter(|id| !id.is_empty());
        let actor = self.actor_id.as_deref().filter(|id| !id.is_empty());

        match (task, actor) {
            (None, None) => Err(EngineError::InvalidRequest(
                "either taskId or actorId must be provided".to_string(),
            )),
            (Some(_), Some(_)) => Err(EngineError::InvalidRequest(
                "provide just taskId or actorId, not both".to_string(),
            )),
            (Some(_), None) if self.options.prefilled_input => Err(EngineError::InvalidRequest(
                "prefilledInput can only be used with actorId".to_string(),
            )),
            (Some(task), None) => Ok(RunTarget::Task(task.to_string())),
            (None, Some(actor)) => Ok(RunTarget::Actor(actor.to_string())),
        }
    }
}

/// Durable subset of the platform run metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    /// Actor the run belongs to
    pub act_id: String,
    /// Default dataset
    #[serde(default)]
    pub default_dataset_id: String,
    /// Default key-value store
    #[serde(default)]
    pub default_key_value_store_id: String,
    /// Default request queue
    #[serde(default)]
    pub default_request_queue_id: String,
    /// Build number, empty when unknown
    #[serde(default)]
    pub build_number: String,
    /// `user/name` of the actor
    #[serde(default)]
    pub actor_name: String,
    /// `user/name` of the task, for task runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Task id, for task runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Label from the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One entry of the fingerprint cache. Created once per fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Key of the entry
    pub fingerprint: Fingerprint,
    /// Platform run started for the fingerprint
    pub run_id: String,
    /// Metadata resolved when the run was started
    pub data: RunData,
}

/// Deep link to a run in the platform console.
pub fn run_link(console_url: &str, data: &RunData, run_id: &str) -> String {
    let base = console_url.trim_end_matches('/');
    match data.task_id.as_deref() {
        Some(task_id) => format!("{base}/tasks/{task_id}#/runs/{run_id}"),
        None => format!("{base}/actors/{}#/runs/{run_id}", data.act_id),
    }
}

/// Collect the limit-like fields present in a run input, in a stable order.
pub fn max_results_hint(input: &Value) -> Option<String> {
    let fields = input.as_object()?;
    let parts: Vec<String> = MAX_RESULT_FIELDS
        .iter()
        .filter_map(|field| {
            let value = fields.get(*field)?;
            value.is_number().then(|| format!("{field}={value}"))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// A finished (or at least waited-for) run, as seen by assertions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Cached record of the run
    #[serde(flatten)]
    pub record: RunRecord,

    /// Input the platform actually ran with, defaults applied
    pub input: Option<Value>,

    #[serde(skip)]
    console_url: String,
}

impl RunResult {
    /// Result linking into the console at `console_url`.
    pub fn new(record: RunRecord, input: Option<Value>, console_url: impl Into<String>) -> Self {
        Self {
            record,
            input,
            console_url: console_url.into(),
        }
    }

    /// Platform run id.
    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }

    /// Fingerprint the run was started for.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.record.fingerprint
    }

    /// Resolved run metadata.
    pub fn data(&self) -> &RunData {
        &self.record.data
    }

    /// A result is usable by matchers once it carries a fingerprint and
    /// resolved run data.
    pub fn is_valid(&self) -> bool {
        !self.record.fingerprint.is_empty()
            && !self.record.run_id.is_empty()
            && !self.record.data.act_id.is_empty()
    }

    /// Console link to the run.
    pub fn link(&self) -> String {
        run_link(&self.console_url, &self.record.data, &self.record.run_id)
    }

    /// Prefix an assertion message with the run header.
    pub fn format(&self, message: &str) -> String {
        let data = &self.record.data;
        let mut out = String::new();

        if let Some(name) = &data.name {
            out.push_str(name);
            out.push('\n');
        }

        match &data.task_name {
            Some(task_name) => out.push_str(&format!("{task_name} - {}", data.actor_name)),
            None => out.push_str(&data.actor_name),
        }
        out.push_str(&format!(":{}\n{} : {message}", data.build_number, self.link()));

        if let Some(input) = &self.input {
            if let Some(hint) = max_results_hint(input) {
                out.push_str(&format!("\nMax results: {hint}"));
            }
            let rendered = input.to_string();
            if rendered.chars().count() > MAX_INPUT_CHARS {
                let cut: String = rendered.chars().take(MAX_INPUT_CHARS).collect();
                out.push_str(&format!("\nInput: {cut}..."));
            } else {
                out.push_str(&format!("\nInput: {rendered}"));
            }
        }

        out
    }
}
