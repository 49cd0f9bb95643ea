//! Deterministic fingerprints for run requests.
//!
//! The fingerprint is xxHash64 over the canonical JSON form of
//! `{ "epoch": <retry epoch>, "request": <request> }`, with every object's
//! keys sorted recursively so two structurally identical requests always
//! hash the same.

use serde::Serialize;
use serde_json::{Map, Value};
use xxhash_rust::xxh64::xxh64;

use crate::domain::errors::EngineResult;
use crate::domain::models::{Fingerprint, RunRequest};

const SEED: u64 = 0;

#[derive(Serialize)]
struct FingerprintInput<'a> {
    epoch: u32,
    request: &'a RunRequest,
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Canonical serialization the fingerprint is computed over.
pub fn canonical_form(request: &RunRequest, epoch: u32) -> EngineResult<String> {
    let value = serde_json::to_value(FingerprintInput { epoch, request })?;
    Ok(serde_json::to_string(&sort_keys(value))?)
}

/// Deduplication key of a request within a retry epoch: xxh64 of the
/// canonical form, as 16 hex digits.
pub fn fingerprint(request: &RunRequest, epoch: u32) -> EngineResult<Fingerprint> {
    let canonical = canonical_form(request, epoch)?;
    let hash = xxh64(canonical.as_bytes(), SEED);
    Ok(Fingerprint::new(format!("{hash:016x}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RunOptions;
    use serde_json::json;

    #[test]
    fn test_identical_requests_share_a_fingerprint() {
        let a = RunRequest::actor("X").with_input(json!({ "a": 1, "b": [1, 2] }));
        let b = RunRequest::actor("X").with_input(json!({ "b": [1, 2], "a": 1 }));

        let fa = fingerprint(&a, 0).unwrap();
        assert_eq!(fa, fingerprint(&a, 0).unwrap());
        assert_eq!(fa, fingerprint(&b, 0).unwrap());
        assert_eq!(fa.as_str().len(), 16);
    }

    #[test]
    fn test_fingerprint_changes_with_request_fields() {
        let base = RunRequest::actor("X").with_input(json!({ "a": 1 }));
        let fp = fingerprint(&base, 0).unwrap();

        let nonce = base.clone().with_nonce("1");
        let input = RunRequest::actor("X").with_input(json!({ "a": 2 }));
        let target = RunRequest::actor("Y").with_input(json!({ "a": 1 }));
        let task = RunRequest::task("X").with_input(json!({ "a": 1 }));
        let options = base.clone().with_options(RunOptions {
            memory_mbytes: Some(512),
            ..Default::default()
        });

        for other in [nonce, input, target, task, options] {
            assert_ne!(fp, fingerprint(&other, 0).unwrap(), "{other:?}");
        }
    }

    #[test]
    fn test_retry_epoch_changes_fingerprint() {
        let request = RunRequest::actor("X");
        assert_ne!(fingerprint(&request, 0).unwrap(), fingerprint(&request, 1).unwrap());
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let request = RunRequest::task("t1").with_input(json!({ "z": true, "a": null }));
        assert_eq!(
            canonical_form(&request, 2).unwrap(),
            r#"{"epoch":2,"request":{"input":{"a":null,"z":true},"options":{},"taskId":"t1"}}"#
        );
    }
}
