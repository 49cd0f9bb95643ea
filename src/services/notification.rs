//! Composes chat and email notifications for a finished pass.

use crate::domain::models::FailureSummary;
use crate::domain::ports::Notification;

/// Links and names shown in notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationContext {
    /// Name of the test run
    pub test_name: String,
    /// Console link to this test run
    pub run_link: Option<String>,
    /// Direct link to the `OUTPUT` record
    pub output_link: Option<String>,
}

impl NotificationContext {
    /// Context without links.
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    /// Link to `run_id` in the console.
    pub fn with_run(mut self, console_url: &str, run_id: &str) -> Self {
        self.run_link = Some(format!(
            "{}/view/runs/{run_id}",
            console_url.trim_end_matches('/')
        ));
        self
    }

    /// Link to the `OUTPUT` record of `store_id`.
    pub fn with_output(mut self, api_base_url: &str, store_id: &str) -> Self {
        self.output_link = Some(format!(
            "{}/v2/key-value-stores/{store_id}/records/OUTPUT?disableRedirect=true",
            api_base_url.trim_end_matches('/')
        ));
        self
    }

    fn slack_title(&self) -> String {
        match &self.run_link {
            Some(link) => format!("<{link}|{}>", self.test_name),
            None => self.test_name.clone(),
        }
    }

    fn slack_output(&self) -> String {
        match &self.output_link {
            Some(link) => format!("<{link}|OUTPUT>"),
            None => "OUTPUT".to_string(),
        }
    }

    fn html_output(&self) -> String {
        match &self.output_link {
            Some(link) => format!("<a href=\"{link}\">OUTPUT</a>"),
            None => "OUTPUT".to_string(),
        }
    }
}

/// Notification listing every failed expectation.
pub fn failure_notification(ctx: &NotificationContext, summary: &FailureSummary) -> Notification {
    let markdown: Vec<String> = summary
        .failed_expectations
        .iter()
        .map(|f| format!("{}\n{}", f.name, f.markdown))
        .collect();
    let html: Vec<String> = summary
        .failed_expectations
        .iter()
        .map(|f| format!("<b>{}</b><br>{}", f.name, f.html))
        .collect();

    let slack = format!(
        "{} has {} failing spec(s) with {} failed expectation(s). Check the {} for full details.\n{}",
        ctx.slack_title(),
        summary.failing_spec_count,
        summary.failed_expectations.len(),
        ctx.slack_output(),
        markdown.join("\n"),
    );
    let email = format!(
        "Check the {} for full details.<br>\n{}",
        ctx.html_output(),
        html.join("\n<br>\n"),
    );

    Notification {
        slack_message: Some(slack),
        email_message: Some(email),
        subject: Some(format!("{} has failing tests", ctx.test_name)),
    }
}

/// Notification sent when the test run itself timed out.
pub fn timeout_notification(ctx: &NotificationContext) -> Notification {
    Notification {
        slack_message: Some(format!(
            "{} timed out before finishing. Raise the run timeout or split the tests.",
            ctx.slack_title()
        )),
        email_message: Some(format!(
            "{} timed out before finishing. Raise the run timeout or split the tests.",
            match &ctx.run_link {
                Some(link) => format!("<a href=\"{link}\">{}</a>", ctx.test_name),
                None => ctx.test_name.clone(),
            }
        )),
        subject: Some(format!("{} timed out", ctx.test_name)),
    }
}
