//! Reduces a result tree to the failure summary used for reporting.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::domain::models::{FailedExpectation, FailureSummary, ResultTree};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://\S+").expect("url pattern compiles"));

/// Link syntax of a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFormat {
    /// Slack flavoured `<url|label>`
    Markdown,
    /// `<a href=url>label</a>`
    Html,
}

fn link_label(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Rewrite every `https://` URL in `body` into a link labelled with the
/// URL's final path segment.
pub fn linkify(body: &str, format: LinkFormat) -> String {
    URL_PATTERN
        .replace_all(body, |caps: &Captures<'_>| {
            let url = &caps[0];
            let label = link_label(url);
            match format {
                LinkFormat::Markdown => format!("<{url}|{label}>"),
                LinkFormat::Html => format!("<a href={url}>{label}</a>"),
            }
        })
        .into_owned()
}

/// Summarize a finished pass.
///
/// A suite without failing specs counts as passing. Every failed
/// expectation of a failing suite yields one entry named
/// `"<suite> <spec>"`. Expectation and spec totals span all suites.
pub fn reduce(tree: &ResultTree) -> FailureSummary {
    let mut summary = FailureSummary::default();

    for suite in &tree.suites {
        summary.total_spec_count += suite.specs.len();
        for spec in &suite.specs {
            summary.total_expectation_count += spec.expectation_count();
            summary.passed_expectation_count += spec.passed_expectations.len();
        }

        if !suite.specs.iter().any(|spec| spec.has_failures()) {
            summary.passing_suite_count += 1;
            continue;
        }

        for spec in suite.specs.iter().filter(|spec| spec.has_failures()) {
            summary.failing_spec_count += 1;
            let name = format!("{} {}", suite.description, spec.description);
            summary
                .failed_expectations
                .extend(spec.failed_expectations.iter().map(|failed| FailedExpectation {
                    name: name.clone(),
                    markdown: linkify(&failed.message, LinkFormat::Markdown),
                    html: linkify(&failed.message, LinkFormat::Html),
                }));
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ExpectationResult, SpecResult, SpecStatus, SuiteResult};

    fn spec(description: &str, passed: usize, failed: &[&str]) -> SpecResult {
        SpecResult {
            id: format!("spec-{description}"),
            description: description.to_string(),
            full_name: description.to_string(),
            status: if failed.is_empty() {
                SpecStatus::Passed
            } else {
                SpecStatus::Failed
            },
            passed_expectations: (0..passed)
                .map(|_| ExpectationResult::passed("toHaveStatus"))
                .collect(),
            failed_expectations: failed
                .iter()
                .map(|m| ExpectationResult::failed("withOutput", *m))
                .collect(),
            duration_ms: 1,
        }
    }

    fn suite(description: &str, specs: Vec<SpecResult>) -> SuiteResult {
        SuiteResult {
            id: format!("suite-{description}"),
            description: description.to_string(),
            full_name: description.to_string(),
            specs,
        }
    }

    #[test]
    fn test_linkify_uses_last_segment_as_label() {
        let body = "run https://console.apify.com/actors/a1#/runs/r9 : Expected status";
        assert_eq!(
            linkify(body, LinkFormat::Markdown),
            "run <https://console.apify.com/actors/a1#/runs/r9|r9> : Expected status"
        );
        assert_eq!(
            linkify(body, LinkFormat::Html),
            "run <a href=https://console.apify.com/actors/a1#/runs/r9>r9</a> : Expected status"
        );
    }

    #[test]
    fn test_linkify_leaves_plain_text_alone() {
        assert_eq!(linkify("no links here", LinkFormat::Markdown), "no links here");
        assert_eq!(
            linkify("http://insecure.example/x", LinkFormat::Html),
            "http://insecure.example/x"
        );
    }

    #[test]
    fn test_linkify_rewrites_every_url() {
        let body = "a https://x.io/one b https://x.io/two";
        assert_eq!(
            linkify(body, LinkFormat::Markdown),
            "a <https://x.io/one|one> b <https://x.io/two|two>"
        );
    }

    #[test]
    fn test_reduce_counts_and_entries() {
        let tree = ResultTree::new(
            "Actor tests",
            vec![
                suite("Facebook", vec![spec("works", 1, &["No OUTPUT"]), spec("logs", 2, &[])]),
                suite("Instagram", vec![spec("posts", 3, &[])]),
                suite("Actor tests", vec![]),
            ],
        );

        let summary = reduce(&tree);
        assert_eq!(summary.failing_spec_count, 1);
        assert_eq!(summary.total_spec_count, 3);
        assert_eq!(summary.passing_suite_count, 2);
        assert_eq!(summary.passed_expectation_count, 6);
        assert_eq!(summary.total_expectation_count, 7);
        assert_eq!(summary.failed_expectations.len(), 1);
        assert_eq!(summary.failed_expectations[0].name, "Facebook works");
        assert_eq!(summary.failed_expectations[0].markdown, "No OUTPUT");
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let tree = ResultTree::new(
            "t",
            vec![suite(
                "S",
                vec![spec("a", 0, &["x https://h.io/1", "y"]), spec("b", 1, &["z"])],
            )],
        );
        assert_eq!(reduce(&tree), reduce(&tree));
        assert_eq!(reduce(&tree).failed_expectations.len(), 3);
        assert_eq!(reduce(&tree).failing_spec_names(), vec!["S a", "S b"]);
    }
}
