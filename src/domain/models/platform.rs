//! Models exchanged with the remote execution platform.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a platform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RunStatus {
    /// Waiting for a worker
    Ready,
    /// Started and not finished
    Running,
    /// Finished with exit code 0
    Succeeded,
    /// Finished with a non-zero exit code
    Failed,
    /// Abort requested
    Aborting,
    /// Stopped by an abort
    Aborted,
    /// Past its timeout and stopping
    TimingOut,
    /// Stopped by its timeout
    TimedOut,
    /// Any status this client does not know
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ready => "READY",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Aborting => "ABORTING",
            RunStatus::Aborted => "ABORTED",
            RunStatus::TimingOut => "TIMING-OUT",
            RunStatus::TimedOut => "TIMED-OUT",
            RunStatus::Unknown => "UNKNOWN",
        }
    }

    /// Statuses a waiter keeps polling on. Unknown statuses end the wait.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            RunStatus::Ready | RunStatus::Running | RunStatus::Aborting | RunStatus::TimingOut
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run as returned by the platform. Only identity and storage ids are
/// modelled; everything else in the payload is dropped on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRun {
    /// Run id
    pub id: String,
    /// Actor the run belongs to
    pub act_id: String,
    /// Task the run was started from, if any
    #[serde(default)]
    pub actor_task_id: Option<String>,
    /// Status at the time of the request
    pub status: RunStatus,
    /// Build number, e.g. `0.2.14`
    #[serde(default)]
    pub build_number: Option<String>,
    /// Default dataset
    #[serde(default)]
    pub default_dataset_id: String,
    /// Default key-value store, holds `INPUT` and `OUTPUT`
    #[serde(default)]
    pub default_key_value_store_id: String,
    /// Default request queue
    #[serde(default)]
    pub default_request_queue_id: String,
}

/// Build behind a tag such as `latest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedBuild {
    /// Build id
    pub build_id: String,
    /// Build number
    #[serde(default)]
    pub build_number: Option<String>,
}

/// Actor metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorInfo {
    /// Actor id
    pub id: String,
    /// Actor name without the owner prefix
    pub name: String,
    /// Builds by tag
    #[serde(default)]
    pub tagged_builds: HashMap<String, TaggedBuild>,
}

impl ActorInfo {
    /// Build the platform runs when no build is requested.
    pub fn latest_build_id(&self) -> Option<&str> {
        self.tagged_builds
            .get("latest")
            .map(|build| build.build_id.as_str())
    }
}

/// Saved task of an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    /// Task id
    pub id: String,
    /// Task name
    pub name: String,
    /// Actor the task runs
    pub act_id: String,
    /// Saved task input
    #[serde(default)]
    pub input: Option<Value>,
}

/// Actor build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Build id
    pub id: String,
    /// Build number
    #[serde(default)]
    pub build_number: Option<String>,
    /// Either a JSON object or its serialized text, depending on the
    /// platform version that produced the build.
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl BuildInfo {
    /// Input schema as JSON, whichever form the platform stored.
    pub fn input_schema(&self) -> Option<Value> {
        match self.input_schema.as_ref()? {
            Value::String(text) => serde_json::from_str(text).ok(),
            other @ Value::Object(_) => Some(other.clone()),
            _ => None,
        }
    }

    /// Prefilled values declared by the input schema, falling back to
    /// declared defaults.
    pub fn prefilled_input(&self) -> Map<String, Value> {
        let mut out = Map::new();
        let Some(schema) = self.input_schema() else {
            return out;
        };
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return out;
        };

        for (field, spec) in properties {
            if let Some(value) = spec.get("prefill").or_else(|| spec.get("default")) {
                out.insert(field.clone(), value.clone());
            }
        }
        out
    }
}

/// A record read from a key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueRecord {
    /// Record key
    pub key: String,
    /// Decoded record body
    pub value: Value,
    /// Content type the record was stored with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Dataset listing options, forwarded verbatim as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListItemsOptions(pub Map<String, Value>);

impl ListItemsOptions {
    /// Options from a JSON object. Anything else gives no options.
    pub fn from_value(value: &Value) -> Self {
        Self(value.as_object().cloned().unwrap_or_default())
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Query pairs. Arrays are joined with commas and nulls are dropped.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    Value::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }
}

/// One page of dataset items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsPage {
    /// Items on this page
    pub items: Vec<Value>,
    /// Items in the whole dataset
    pub total: u64,
    /// Index of the first item
    pub offset: u64,
    /// Number of items returned
    pub count: u64,
    /// Page size that was requested
    pub limit: u64,
}

/// Ad-hoc webhook bound to a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSpec {
    /// Run events that fire the webhook
    pub event_types: Vec<String>,
    /// URL the platform POSTs to
    pub request_url: String,
    /// Makes a repeated registration a no-op
    pub idempotency_key: String,
    /// Body POSTed to `request_url`
    pub payload_template: String,
    /// Run the webhook is bound to
    pub actor_run_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        let status: RunStatus = serde_json::from_value(json!("TIMED-OUT")).unwrap();
        assert_eq!(status, RunStatus::TimedOut);
        assert_eq!(RunStatus::TimingOut.as_str(), "TIMING-OUT");

        let unknown: RunStatus = serde_json::from_value(json!("PAUSED")).unwrap();
        assert_eq!(unknown, RunStatus::Unknown);
        assert!(!unknown.is_in_progress());
    }

    #[test]
    fn test_in_progress_set() {
        assert!(RunStatus::Ready.is_in_progress());
        assert!(RunStatus::Running.is_in_progress());
        assert!(RunStatus::Aborting.is_in_progress());
        assert!(!RunStatus::Succeeded.is_in_progress());
        assert!(!RunStatus::Failed.is_in_progress());
    }

    #[test]
    fn test_actor_run_drops_volatile_fields() {
        let run: ActorRun = serde_json::from_value(json!({
            "id": "r1",
            "actId": "a1",
            "status": "RUNNING",
            "buildNumber": "1.2.3",
            "defaultDatasetId": "d1",
            "defaultKeyValueStoreId": "k1",
            "defaultRequestQueueId": "q1",
            "startedAt": "2024-01-01T00:00:00.000Z",
            "stats": { "computeUnits": 1.5 },
            "containerUrl": "https://abc.runs.apify.net"
        }))
        .unwrap();

        assert_eq!(run.id, "r1");
        assert_eq!(run.build_number.as_deref(), Some("1.2.3"));
        let back = serde_json::to_value(&run).unwrap();
        assert!(back.get("stats").is_none());
        assert!(back.get("containerUrl").is_none());
    }

    #[test]
    fn test_prefilled_input_from_string_schema() {
        let schema = json!({
            "properties": {
                "startUrls": { "type": "array", "prefill": [{ "url": "https://apify.com" }] },
                "maxItems": { "type": "integer", "default": 10 },
                "proxy": { "type": "object" }
            }
        });
        let build = BuildInfo {
            id: "b1".to_string(),
            build_number: Some("0.0.1".to_string()),
            input_schema: Some(Value::String(schema.to_string())),
        };

        let prefill = build.prefilled_input();
        assert_eq!(prefill.len(), 2);
        assert_eq!(prefill["maxItems"], json!(10));
        assert_eq!(prefill["startUrls"][0]["url"], json!("https://apify.com"));
    }

    #[test]
    fn test_list_items_query_rendering() {
        let options = ListItemsOptions::from_value(&json!({
            "limit": 10,
            "clean": true,
            "fields": ["url", "title"],
            "desc": null
        }));
        let mut query = options.to_query();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("clean".to_string(), "true".to_string()),
                ("fields".to_string(), "url,title".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }
}
