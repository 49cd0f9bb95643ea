//! Test result tree produced by the harness and the summary derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single expectation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationResult {
    /// Matcher that produced the outcome, or `timeout`
    pub matcher_name: String,
    /// `Passed.` or the failure text
    pub message: String,
    /// Whether the expectation held
    pub passed: bool,
}

impl ExpectationResult {
    /// A passing outcome.
    pub fn passed(matcher_name: impl Into<String>) -> Self {
        Self {
            matcher_name: matcher_name.into(),
            message: "Passed.".to_string(),
            passed: true,
        }
    }

    /// A failing outcome with its message.
    pub fn failed(matcher_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            matcher_name: matcher_name.into(),
            message: message.into(),
            passed: false,
        }
    }
}

/// Final status of a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecStatus {
    /// Every expectation held
    Passed,
    /// At least one expectation failed
    Failed,
    /// Filtered out of this pass
    Excluded,
}

/// Result of one spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecResult {
    /// `spec<N>`, unique within the tree
    pub id: String,
    /// Spec name
    pub description: String,
    /// Suite names and spec name joined by spaces
    pub full_name: String,
    /// Final status
    pub status: SpecStatus,
    /// Expectations that held
    #[serde(default)]
    pub passed_expectations: Vec<ExpectationResult>,
    /// Expectations that failed
    #[serde(default)]
    pub failed_expectations: Vec<ExpectationResult>,
    /// Wall time of the spec
    #[serde(default)]
    pub duration_ms: u64,
}

impl SpecResult {
    /// True when any expectation failed.
    pub fn has_failures(&self) -> bool {
        !self.failed_expectations.is_empty()
    }

    /// Passed plus failed expectations.
    pub fn expectation_count(&self) -> usize {
        self.passed_expectations.len() + self.failed_expectations.len()
    }
}

/// A suite with the specs declared directly inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResult {
    /// `suite<N>`, unique within the tree
    pub id: String,
    /// Suite name
    pub description: String,
    /// Names of the enclosing suites and this one
    pub full_name: String,
    /// Specs declared directly in this suite
    #[serde(default)]
    pub specs: Vec<SpecResult>,
}

/// Everything the harness observed during one pass. Written as the
/// `OUTPUT` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTree {
    /// Name of the test run
    pub test_name: String,
    /// When the pass finished
    pub finished_at: DateTime<Utc>,
    /// Retry epoch of the pass that produced the tree
    #[serde(default)]
    pub retry_epoch: u32,
    /// Suites in execution order. The first is the top-level suite
    #[serde(default)]
    pub suites: Vec<SuiteResult>,
}

impl ResultTree {
    /// Tree finished now, at epoch 0.
    pub fn new(test_name: impl Into<String>, suites: Vec<SuiteResult>) -> Self {
        Self {
            test_name: test_name.into(),
            finished_at: Utc::now(),
            retry_epoch: 0,
            suites,
        }
    }
}

/// One failed expectation, pre-rendered for chat and email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedExpectation {
    /// `"<suite> <spec>"`
    pub name: String,
    /// Slack markdown
    pub markdown: String,
    /// Email HTML
    pub html: String,
}

/// Counts and failures derived from a [`ResultTree`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    /// Failures in execution order
    pub failed_expectations: Vec<FailedExpectation>,
    /// Expectations that held
    pub passed_expectation_count: usize,
    /// All expectations evaluated
    pub total_expectation_count: usize,
    /// Specs in the tree, excluded ones included
    pub total_spec_count: usize,
    /// Specs with at least one failure
    pub failing_spec_count: usize,
    /// Suites without a failing spec
    pub passing_suite_count: usize,
}

impl FailureSummary {
    /// True when any spec failed.
    pub fn has_failures(&self) -> bool {
        self.failing_spec_count > 0
    }

    /// Names of failing specs, first occurrence order, without repeats.
    pub fn failing_spec_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for failed in &self.failed_expectations {
            if !names.contains(&failed.name) {
                names.push(failed.name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_spec_names_are_deduplicated_in_order() {
        let entry = |name: &str| FailedExpectation {
            name: name.to_string(),
            markdown: String::new(),
            html: String::new(),
        };
        let summary = FailureSummary {
            failed_expectations: vec![entry("S b"), entry("S a"), entry("S b")],
            failing_spec_count: 2,
            ..Default::default()
        };

        assert_eq!(summary.failing_spec_names(), vec!["S b", "S a"]);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_result_tree_round_trips_through_json() {
        let tree = ResultTree::new(
            "Actor tests",
            vec![SuiteResult {
                id: "suite1".to_string(),
                description: "Scraper".to_string(),
                full_name: "Actor tests Scraper".to_string(),
                specs: vec![SpecResult {
                    id: "spec0".to_string(),
                    description: "works".to_string(),
                    full_name: "Actor tests Scraper works".to_string(),
                    status: SpecStatus::Failed,
                    passed_expectations: vec![ExpectationResult::passed("toHaveStatus")],
                    failed_expectations: vec![ExpectationResult::failed("withOutput", "No OUTPUT")],
                    duration_ms: 12,
                }],
            }],
        );

        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["suites"][0]["specs"][0]["status"], "failed");
        let back: ResultTree = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
