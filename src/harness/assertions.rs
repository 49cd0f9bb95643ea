//! Declarative checks used in place of assertion callbacks.
//!
//! Paths are dot separated. Numeric segments index arrays and a trailing
//! `length` segment yields the size of an array, string or object:
//! `info.cleanItemCount`, `dataset.items.0.url`, `dataset.items.length`.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::domain::models::{Assertion, CheckOp};
use crate::services::matchers::Verifier;

/// Resolve a dotted path. `None` when any segment is missing.
///
/// The walk borrows from `root`; only the resolved value is cloned.
pub fn lookup(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
    while let Some(segment) = segments.next() {
        current = match (current, segment) {
            (Value::Object(map), key) if map.contains_key(key) => &map[key],
            (_, "length") => {
                let size = match current {
                    Value::Array(items) => items.len(),
                    Value::String(text) => text.chars().count(),
                    Value::Object(map) => map.len(),
                    _ => return None,
                };
                // a size has no children
                return segments.peek().is_none().then(|| json!(size));
            }
            (Value::Array(items), index) => items.get(index.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

fn ordering(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match (actual, needle) {
        (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(value) => {
            let rendered = value.to_string();
            if rendered.chars().count() > 200 {
                format!("{}...", rendered.chars().take(200).collect::<String>())
            } else {
                rendered
            }
        }
    }
}

impl Assertion {
    /// Evaluate against a callback subject. `Err` carries the failure message.
    pub fn check(&self, subject: &Value) -> Result<(), String> {
        let actual = lookup(subject, &self.path);
        let actual_ref = actual.as_ref();
        let expected = &self.value;
        let target = if self.path.is_empty() {
            "value".to_string()
        } else {
            self.path.clone()
        };

        let (ok, expectation) = match self.op {
            CheckOp::Eq => (
                actual_ref.is_some_and(|a| loosely_equal(a, expected)),
                format!("to equal {expected}"),
            ),
            CheckOp::Ne => (
                !actual_ref.is_some_and(|a| loosely_equal(a, expected)),
                format!("not to equal {expected}"),
            ),
            CheckOp::Gt | CheckOp::Gte | CheckOp::Lt | CheckOp::Lte => {
                use std::cmp::Ordering::*;
                let ord = actual_ref.and_then(|a| ordering(a, expected));
                let (ok, word) = match self.op {
                    CheckOp::Gt => (ord == Some(Greater), "greater than"),
                    CheckOp::Gte => (matches!(ord, Some(Greater | Equal)), "at least"),
                    CheckOp::Lt => (ord == Some(Less), "less than"),
                    _ => (matches!(ord, Some(Less | Equal)), "at most"),
                };
                (ok, format!("to be {word} {expected}"))
            }
            CheckOp::Contains => (
                actual_ref.is_some_and(|a| contains(a, expected)),
                format!("to contain {expected}"),
            ),
            CheckOp::Matches => {
                let pattern = expected.as_str().unwrap_or_default();
                let regex = Regex::new(pattern)
                    .map_err(|e| format!("Invalid pattern for {target}: {e}"))?;
                (
                    actual_ref
                        .and_then(Value::as_str)
                        .is_some_and(|text| regex.is_match(text)),
                    format!("to match /{pattern}/"),
                )
            }
            CheckOp::Exists => (
                actual_ref.is_some_and(|a| !a.is_null()),
                "to exist".to_string(),
            ),
            CheckOp::Missing => (
                actual_ref.is_none_or(Value::is_null),
                "to be missing".to_string(),
            ),
            CheckOp::Empty => (is_empty(actual_ref), "to be empty".to_string()),
            CheckOp::NotEmpty => (!is_empty(actual_ref), "not to be empty".to_string()),
        };

        if ok {
            Ok(())
        } else {
            Err(format!(
                "Expected {target} ({}) {expectation}",
                describe(actual_ref)
            ))
        }
    }
}

/// Verifier running a list of assertions; the first failure wins.
#[derive(Debug, Clone, Default)]
pub struct AssertionVerifier {
    assertions: Vec<Assertion>,
}

impl AssertionVerifier {
    /// Verifier running `assertions` in order.
    pub fn new(assertions: Vec<Assertion>) -> Self {
        Self { assertions }
    }
}

#[async_trait]
impl Verifier for AssertionVerifier {
    async fn verify(&self, subject: &Value) -> Result<(), String> {
        self.assertions
            .iter()
            .try_for_each(|assertion| assertion.check(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion(path: &str, op: CheckOp, value: Value) -> Assertion {
        Assertion {
            path: path.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_lookup_paths() {
        let subject = json!({
            "info": { "cleanItemCount": 3 },
            "dataset": { "items": [{ "url": "https://a" }, { "url": "https://b" }] }
        });
        assert_eq!(lookup(&subject, "info.cleanItemCount"), Some(json!(3)));
        assert_eq!(lookup(&subject, "dataset.items.1.url"), Some(json!("https://b")));
        assert_eq!(lookup(&subject, "dataset.items.length"), Some(json!(2)));
        assert_eq!(lookup(&subject, "dataset.items.9"), None);
        assert_eq!(lookup(&subject, "nope.deeper"), None);
        assert_eq!(lookup(&subject, ""), Some(subject.clone()));
        assert_eq!(lookup(&subject, "dataset.items.length.0"), None);
        assert_eq!(lookup(&subject, "info.cleanItemCount.length"), None);
    }

    #[test]
    fn test_numeric_comparisons() {
        let subject = json!({ "n": 16 });
        assert!(assertion("n", CheckOp::Gt, json!(15)).check(&subject).is_ok());
        assert!(assertion("n", CheckOp::Gte, json!(16.0)).check(&subject).is_ok());
        assert!(assertion("n", CheckOp::Eq, json!(16.0)).check(&subject).is_ok());

        let err = assertion("n", CheckOp::Lt, json!(10)).check(&subject).unwrap_err();
        assert_eq!(err, "Expected n (16) to be less than 10");
    }

    #[test]
    fn test_string_and_collection_ops() {
        let subject = json!({ "log": "Crawler finished", "tags": ["a", "b"], "empty": [] });
        assert!(assertion("log", CheckOp::Contains, json!("finished")).check(&subject).is_ok());
        assert!(assertion("log", CheckOp::Matches, json!("^Crawler")).check(&subject).is_ok());
        assert!(assertion("tags", CheckOp::Contains, json!("b")).check(&subject).is_ok());
        assert!(assertion("empty", CheckOp::Empty, Value::Null).check(&subject).is_ok());
        assert!(assertion("tags", CheckOp::NotEmpty, Value::Null).check(&subject).is_ok());
        assert!(assertion("absent", CheckOp::Missing, Value::Null).check(&subject).is_ok());
        assert!(assertion("absent", CheckOp::Exists, Value::Null).check(&subject).is_err());
    }

    #[test]
    fn test_invalid_pattern_fails_instead_of_panicking() {
        let err = assertion("log", CheckOp::Matches, json!("("))
            .check(&json!({ "log": "x" }))
            .unwrap_err();
        assert!(err.starts_with("Invalid pattern for log"));
    }

    #[tokio::test]
    async fn test_verifier_reports_first_failure() {
        let verifier = AssertionVerifier::new(vec![
            assertion("a", CheckOp::Eq, json!(1)),
            assertion("b", CheckOp::Eq, json!(2)),
            assertion("c", CheckOp::Eq, json!(3)),
        ]);
        let err = verifier.verify(&json!({ "a": 1, "b": 0, "c": 0 })).await.unwrap_err();
        assert_eq!(err, "Expected b (0) to equal 2");
        assert!(AssertionVerifier::default().verify(&Value::Null).await.is_ok());
    }
}
