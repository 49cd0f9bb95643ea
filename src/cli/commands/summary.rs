//! `runcheck summary`: render a stored `OUTPUT` record.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;
use console::style;
use serde::Serialize;

use crate::cli::output::{colorize_status, list_table, output, truncate, CommandOutput};
use crate::domain::models::{FailureSummary, ResultTree, SpecStatus};
use crate::services::reduce;

/// Render a stored OUTPUT record
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Path to an OUTPUT record (JSON)
    pub path: PathBuf,
}

/// One spec line of a report.
#[derive(Debug, Serialize)]
pub struct SpecRow {
    /// Full spec name
    pub name: String,
    /// Final status
    pub status: SpecStatus,
    /// Expectations that held
    pub passed: usize,
    /// Expectations evaluated
    pub total: usize,
}

/// One failed expectation of a report.
#[derive(Debug, Serialize)]
pub struct FailureRow {
    /// `<suite> <spec>`
    pub name: String,
    /// Failure text with links in Slack markdown
    pub message: String,
}

/// Human and JSON rendering of a result tree.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutput {
    /// Name of the test run
    pub test_name: String,
    /// Retry epoch of the pass
    pub retry_epoch: u32,
    /// Specs in the tree
    pub total_specs: usize,
    /// Specs with a failure
    pub failing_specs: usize,
    /// Expectations that held
    pub passed_expectations: usize,
    /// Expectations evaluated
    pub total_expectations: usize,
    /// Every spec, in execution order
    pub specs: Vec<SpecRow>,
    /// Every failed expectation
    pub failures: Vec<FailureRow>,
    /// How the pass ended, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl ReportOutput {
    /// Report of a tree and its summary.
    pub fn new(tree: &ResultTree, summary: &FailureSummary) -> Self {
        let specs = tree
            .suites
            .iter()
            .flat_map(|suite| suite.specs.iter())
            .map(|spec| SpecRow {
                name: spec.full_name.clone(),
                status: spec.status,
                passed: spec.passed_expectations.len(),
                total: spec.expectation_count(),
            })
            .collect();

        Self {
            test_name: tree.test_name.clone(),
            retry_epoch: tree.retry_epoch,
            total_specs: summary.total_spec_count,
            failing_specs: summary.failing_spec_count,
            passed_expectations: summary.passed_expectation_count,
            total_expectations: summary.total_expectation_count,
            specs,
            failures: summary
                .failed_expectations
                .iter()
                .map(|failed| FailureRow {
                    name: failed.name.clone(),
                    message: failed.markdown.clone(),
                })
                .collect(),
            outcome: None,
        }
    }

    /// Attach how the pass ended.
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }
}

impl CommandOutput for ReportOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} (retry epoch {})",
            style(&self.test_name).bold(),
            self.retry_epoch
        )];

        if self.specs.is_empty() {
            lines.push("No specs found.".to_string());
        } else {
            let mut table = list_table(&["spec", "status", "expectations"]);
            for spec in &self.specs {
                let status = match spec.status {
                    SpecStatus::Passed => "passed",
                    SpecStatus::Failed => "failed",
                    SpecStatus::Excluded => "excluded",
                };
                table.add_row(vec![
                    Cell::new(truncate(&spec.name, 80)),
                    Cell::new(colorize_status(status)),
                    Cell::new(format!("{}/{}", spec.passed, spec.total)),
                ]);
            }
            lines.push(table.to_string());
        }

        lines.push(format!(
            "\n{} of {} spec(s) failing, {} of {} expectation(s) passed",
            self.failing_specs, self.total_specs, self.passed_expectations, self.total_expectations
        ));

        if !self.failures.is_empty() {
            lines.push(format!("\n{}", style("Failures:").red().bold()));
            for failure in &self.failures {
                lines.push(format!("  {} {}", style(&failure.name).bold(), failure.message));
            }
        }

        if let Some(outcome) = &self.outcome {
            lines.push(format!("\nOutcome: {}", colorize_status(outcome)));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run `runcheck summary`.
pub async fn execute(args: SummaryArgs, json_mode: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.path)
        .await
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let tree: ResultTree = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a test OUTPUT record", args.path.display()))?;

    let summary = reduce(&tree);
    output(&ReportOutput::new(&tree, &summary), json_mode);
    Ok(())
}
