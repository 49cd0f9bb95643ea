//! Decides how a finished pass ends: success, hard failure or a single
//! relaunch narrowed to the failing specs.

use tracing::info;

use crate::domain::errors::{EngineError, EngineResult};
use crate::domain::models::{FailureSummary, RelaunchPlan, TestRunInput};

/// Where the controller is in deciding a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Specs are still running
    Running,
    /// A summary is being evaluated
    Evaluating,
    /// Decided: success
    TerminalSuccess,
    /// Decided: failure, no retry
    TerminalFailure,
    /// Decided: relaunch with the failing specs
    Relaunch,
}

/// How a pass ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No failing spec
    Success,
    /// Failing specs and no retry left
    Failure {
        /// Specs with a failure
        failing_specs: usize,
        /// Failed expectations across those specs
        failed_expectations: usize,
    },
    /// Run the failing specs again in a fresh process
    Relaunch(RelaunchPlan),
}

impl Decision {
    /// Notifications are held back when another pass follows.
    pub fn should_notify(&self) -> bool {
        !matches!(self, Decision::Relaunch(_))
    }

    /// Surface a failing pass as an error.
    pub fn into_result(self) -> EngineResult<()> {
        match self {
            Decision::Failure {
                failing_specs,
                failed_expectations,
            } => Err(EngineError::AggregateFailure {
                failing_specs,
                failed_expectations,
            }),
            Decision::Success | Decision::Relaunch(_) => Ok(()),
        }
    }
}

/// Decides the outcome of a pass. A relaunch happens at most once per run.
#[derive(Debug)]
pub struct RetryController {
    retry_failed_tests: bool,
    retry_epoch: u32,
    state: RetryState,
}

impl RetryController {
    /// Controller for a pass at `retry_epoch`.
    pub fn new(retry_failed_tests: bool, retry_epoch: u32) -> Self {
        Self {
            retry_failed_tests,
            retry_epoch,
            state: RetryState::Running,
        }
    }

    /// Controller configured by the test input.
    pub fn from_input(input: &TestRunInput) -> Self {
        Self::new(input.retry_failed_tests, input.retry_epoch)
    }

    /// Current state.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Decide the outcome of the pass.
    pub fn decide(&mut self, summary: &FailureSummary) -> Decision {
        self.state = RetryState::Evaluating;

        if !summary.has_failures() {
            self.state = RetryState::TerminalSuccess;
            return Decision::Success;
        }

        if !self.retry_failed_tests {
            self.state = RetryState::TerminalFailure;
            return Decision::Failure {
                failing_specs: summary.failing_spec_count,
                failed_expectations: summary.failed_expectations.len(),
            };
        }

        let filter: Vec<String> = summary
            .failing_spec_names()
            .iter()
            .map(|name| regex::escape(name))
            .collect();
        info!(specs = filter.len(), "retrying failing specs");

        self.state = RetryState::Relaunch;
        Decision::Relaunch(RelaunchPlan {
            filter,
            retry_failed_tests: false,
            retry_epoch: self.retry_epoch + 1,
        })
    }
}
