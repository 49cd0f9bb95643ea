//! Declarative test programs.
//!
//! A program is a tree of suites and specs. Each spec runs one or more
//! steps; a step invokes a run and evaluates expectations against it.
//!
//! ```yaml
//! suites:
//!   - name: Facebook
//!     specs:
//!       - name: works with biz listings
//!         steps:
//!           - run:
//!               actorId: pocesar/facebook-pages-scraper
//!               input: { maxPosts: 20 }
//!             expect:
//!               - matcher: toHaveStatus
//!                 value: SUCCEEDED
//!               - matcher: withDataset
//!                 assert:
//!                   - { path: info.cleanItemCount, op: gt, value: 15 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run::RunRequest;

/// A parsed test program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProgram {
    /// Top-level suites, in declaration order
    #[serde(default)]
    pub suites: Vec<SuiteDef>,
}

/// A named group of specs and nested suites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteDef {
    /// Suite name, prefixed to the full name of every spec below it
    pub name: String,
    /// Specs run in order, one at a time
    #[serde(default)]
    pub specs: Vec<SpecDef>,
    /// Nested suites, run after this suite's own specs
    #[serde(default)]
    pub suites: Vec<SuiteDef>,
}

/// A single spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDef {
    /// Spec name
    pub name: String,
    /// Steps run in order
    #[serde(default)]
    pub steps: Vec<StepDef>,
    /// Overrides the run-wide default timeout for this spec
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Start (or reuse) one run, then check it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDef {
    /// Run to start
    pub run: RunRequest,
    /// Expectations checked against the finished run
    #[serde(default)]
    pub expect: Vec<ExpectationDef>,
}

/// One matcher applied to the run started by a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationDef {
    /// Registered matcher name, e.g. `withDataset`
    pub matcher: String,
    /// Expected value for value-comparing matchers such as `toHaveStatus`
    #[serde(default)]
    pub value: Option<Value>,
    /// Positional option objects, consumed left to right by the matcher
    #[serde(default)]
    pub options: Vec<Value>,
    /// Checks run by the callback of callback-style matchers
    #[serde(default)]
    pub assert: Vec<Assertion>,
}

/// Comparison applied by an [`Assertion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckOp {
    /// Equal to `value`
    Eq,
    /// Not equal to `value`
    Ne,
    /// Greater than `value`
    Gt,
    /// Greater than or equal to `value`
    Gte,
    /// Less than `value`
    Lt,
    /// Less than or equal to `value`
    Lte,
    /// String contains `value`, or array contains an element equal to it
    Contains,
    /// String matches the regex in `value`
    Matches,
    /// Path resolves to a non-null value
    Exists,
    /// Path does not resolve, or resolves to null
    Missing,
    /// Empty string, array or object
    Empty,
    /// Non-empty string, array or object
    NotEmpty,
}

/// A check on the value found at a dotted path of the callback argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    /// Dotted path into the callback argument. Empty means the argument itself
    #[serde(default)]
    pub path: String,
    /// Comparison
    pub op: CheckOp,
    /// Operand, ignored by the unary operators
    #[serde(default)]
    pub value: Value,
}

impl TestProgram {
    /// Every matcher name referenced anywhere in the program.
    pub fn matcher_names(&self) -> Vec<&str> {
        fn walk<'a>(suite: &'a SuiteDef, out: &mut Vec<&'a str>) {
            for spec in &suite.specs {
                for step in &spec.steps {
                    out.extend(step.expect.iter().map(|e| e.matcher.as_str()));
                }
            }
            for child in &suite.suites {
                walk(child, out);
            }
        }

        let mut out = Vec::new();
        for suite in &self.suites {
            walk(suite, &mut out);
        }
        out
    }
}
