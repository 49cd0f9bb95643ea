//! Collects spec outcomes into the result tree written as `OUTPUT`.

use crate::domain::models::{ResultTree, SpecResult, SpecStatus, SuiteResult, ExpectationResult};

/// Outcome of one spec before ids are assigned.
#[derive(Debug, Clone, Default)]
pub struct SpecOutcome {
    /// Expectations that held
    pub passed: Vec<ExpectationResult>,
    /// Expectations that failed, including a timeout
    pub failed: Vec<ExpectationResult>,
    /// Skipped by the spec filter
    pub excluded: bool,
    /// Wall time of the spec
    pub duration_ms: u64,
}

impl SpecOutcome {
    /// Outcome of a filtered-out spec.
    pub fn excluded() -> Self {
        Self {
            excluded: true,
            ..Default::default()
        }
    }

    /// Excluded wins, then any failure.
    pub fn status(&self) -> SpecStatus {
        if self.excluded {
            SpecStatus::Excluded
        } else if self.failed.is_empty() {
            SpecStatus::Passed
        } else {
            SpecStatus::Failed
        }
    }
}

/// Builds a [`ResultTree`] suite by suite. Spec ids are numbered across the
/// whole tree.
#[derive(Debug, Default)]
pub struct ResultCollector {
    suites: Vec<SuiteResult>,
    spec_seq: usize,
}

impl ResultCollector {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a suite and return its index for [`ResultCollector::spec`].
    pub fn suite(&mut self, description: &str, full_name: &str) -> usize {
        let index = self.suites.len();
        self.suites.push(SuiteResult {
            id: format!("suite{}", index + 1),
            description: description.to_string(),
            full_name: full_name.to_string(),
            specs: Vec::new(),
        });
        index
    }

    /// Append a spec to the suite at `suite`.
    pub fn spec(&mut self, suite: usize, description: &str, full_name: &str, outcome: SpecOutcome) {
        let status = outcome.status();
        let result = SpecResult {
            id: format!("spec{}", self.spec_seq),
            description: description.to_string(),
            full_name: full_name.to_string(),
            status,
            passed_expectations: outcome.passed,
            failed_expectations: outcome.failed,
            duration_ms: outcome.duration_ms,
        };
        self.spec_seq += 1;
        if let Some(suite) = self.suites.get_mut(suite) {
            suite.specs.push(result);
        }
    }

    /// The finished tree.
    pub fn finish(self, test_name: &str) -> ResultTree {
        ResultTree::new(test_name, self.suites)
    }
}
