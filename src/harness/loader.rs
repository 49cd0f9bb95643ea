//! Declarative program loader.
//!
//! Sources are YAML or JSON. Before the program is decoded, string values
//! of the form `${customData.<path>}` and `${testName}` are replaced with
//! data from the run input, so one program can be reused across tasks.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use super::assertions::lookup;
use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::TestProgram;
use crate::domain::ports::{ProgramContext, TestProgramLoader};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*(testName|customData(?:\.[^}\s]+)?)\s*\}").expect("valid placeholder regex")
});

/// Loads YAML or JSON test programs, substituting placeholders first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeLoader;

impl DeclarativeLoader {
    /// A loader.
    pub fn new() -> Self {
        Self
    }

    fn parse(source: &str) -> EngineResult<Value> {
        let trimmed = source.trim_start();
        if trimmed.is_empty() {
            return Err(EngineError::Usage("test program is empty".to_string()));
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| EngineError::Usage(format!("invalid JSON test program: {e}")));
        }
        serde_yaml::from_str(source)
            .map_err(|e| EngineError::Usage(format!("invalid YAML test program: {e}")))
    }

    fn resolve(expression: &str, context: &ProgramContext) -> Value {
        if expression == "testName" {
            return Value::String(context.test_name.clone());
        }
        let path = expression.strip_prefix("customData").unwrap_or_default();
        lookup(&context.custom_data, path.trim_start_matches('.')).unwrap_or(Value::Null)
    }

    fn interpolate(value: Value, context: &ProgramContext) -> Value {
        match value {
            Value::String(text) => {
                // a lone placeholder keeps the type of the referenced value
                if let Some(caps) = PLACEHOLDER.captures(&text) {
                    if caps.get(0).is_some_and(|m| m.as_str() == text) {
                        return Self::resolve(&caps[1], context);
                    }
                }
                let replaced = PLACEHOLDER.replace_all(&text, |caps: &Captures| {
                    match Self::resolve(&caps[1], context) {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    }
                });
                Value::String(replaced.into_owned())
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| Self::interpolate(item, context))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, item)| (key, Self::interpolate(item, context)))
                    .collect(),
            ),
            other => other,
        }
    }
}

impl TestProgramLoader for DeclarativeLoader {
    fn load(&self, source: &str, context: &ProgramContext) -> EngineResult<TestProgram> {
        let raw = Self::interpolate(Self::parse(source)?, context);
        let program: TestProgram = serde_json::from_value(raw)
            .map_err(|e| EngineError::Usage(format!("invalid test program: {e}")))?;

        if program.suites.is_empty() {
            return Err(EngineError::Usage(
                "test program declares no suites".to_string(),
            ));
        }

        if let Some(unknown) = program
            .matcher_names()
            .into_iter()
            .find(|name| !context.matchers.contains(name))
        {
            return Err(EngineError::Usage(format!(
                "unknown matcher \"{unknown}\", expected one of: {}",
                context.matchers.join(", ")
            )));
        }

        debug!(suites = program.suites.len(), "loaded test program");
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ProgramContext {
        ProgramContext {
            test_name: "Facebook tests".to_string(),
            custom_data: json!({ "page": "https://facebook.com/biz", "limits": { "posts": 20 } }),
            matchers: vec!["toHaveStatus", "withDataset"],
        }
    }

    #[test]
    fn test_loads_yaml_with_placeholders() {
        let source = r#"
suites:
  - name: Pages
    specs:
      - name: posts
        timeoutMs: 5000
        steps:
          - run:
              actorId: pocesar/facebook-pages-scraper
              input:
                startUrls: ["${customData.page}"]
                maxPosts: "${customData.limits.posts}"
                label: "${testName} run"
            expect:
              - matcher: toHaveStatus
                value: SUCCEEDED
              - matcher: withDataset
                assert:
                  - { path: info.cleanItemCount, op: gt, value: 15 }
"#;
        let program = DeclarativeLoader::new().load(source, &context()).unwrap();
        let spec = &program.suites[0].specs[0];
        let input = &spec.steps[0].run.input;

        assert_eq!(spec.timeout_ms, Some(5000));
        assert_eq!(input["startUrls"][0], "https://facebook.com/biz");
        assert_eq!(input["maxPosts"], 20);
        assert_eq!(input["label"], "Facebook tests run");
        assert_eq!(spec.steps[0].expect.len(), 2);
    }

    #[test]
    fn test_loads_json() {
        let source = r#"{"suites":[{"name":"S","specs":[{"name":"a","steps":[]}]}]}"#;
        let program = DeclarativeLoader::new().load(source, &context()).unwrap();
        assert_eq!(program.suites[0].specs[0].name, "a");
    }

    #[test]
    fn test_rejects_unknown_matcher() {
        let source = r#"
suites:
  - name: S
    specs:
      - name: a
        steps:
          - run: { actorId: x }
            expect:
              - matcher: toBeFast
"#;
        let err = DeclarativeLoader::new().load(source, &context()).unwrap_err();
        assert!(matches!(err, EngineError::Usage(ref m) if m.contains("toBeFast")));
    }

    #[test]
    fn test_rejects_empty_and_malformed_sources() {
        let loader = DeclarativeLoader::new();
        assert!(matches!(loader.load("  ", &context()), Err(EngineError::Usage(_))));
        assert!(matches!(loader.load("{ nope", &context()), Err(EngineError::Usage(_))));
        assert!(matches!(loader.load("suites: []", &context()), Err(EngineError::Usage(_))));
    }
}
