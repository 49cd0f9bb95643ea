//! Notifier that delivers through platform actors.
//!
//! Slack messages go through the Slack-message actor and email through the
//! send-mail actor. Runs are started and not waited for.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info};

use crate::domain::models::{EngineConfig, RunOptions, RunTarget, TestRunInput};
use crate::domain::ports::{Notification, Notifier, Platform};

/// Where notifications are delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyTargets {
    /// Slack bot token
    pub slack_token: Option<String>,
    /// Slack channel
    pub slack_channel: Option<String>,
    /// Email address
    pub email: Option<String>,
}

impl NotifyTargets {
    /// Targets configured in the test input. Incomplete Slack settings are dropped.
    pub fn from_input(input: &TestRunInput) -> Self {
        let (slack_token, slack_channel) = match input.slack_target() {
            Some((token, channel)) => (Some(token.to_string()), Some(channel.to_string())),
            None => (None, None),
        };
        Self {
            slack_token,
            slack_channel,
            email: input.email_address().map(str::to_string),
        }
    }
}

/// Delivers notifications by starting the Slack and email actors.
pub struct PlatformNotifier {
    platform: Arc<dyn Platform>,
    targets: NotifyTargets,
    slack_actor_id: String,
    email_actor_id: String,
}

impl PlatformNotifier {
    /// Notifier using the actors configured in `engine`.
    pub fn new(platform: Arc<dyn Platform>, targets: NotifyTargets, engine: &EngineConfig) -> Self {
        Self {
            platform,
            targets,
            slack_actor_id: engine.slack_actor_id.clone(),
            email_actor_id: engine.email_actor_id.clone(),
        }
    }

    async fn start(&self, actor_id: &str, input: serde_json::Value) -> bool {
        let target = RunTarget::Actor(actor_id.to_string());
        match self
            .platform
            .start_run(&target, &input, &RunOptions::default())
            .await
        {
            Ok(_) => true,
            Err(err) => {
                error!(actor_id, error = %err, "notification delivery failed");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for PlatformNotifier {
    async fn notify(&self, notification: &Notification) {
        if let (Some(token), Some(channel), Some(text)) = (
            self.targets.slack_token.as_deref(),
            self.targets.slack_channel.as_deref(),
            notification.slack_message.as_deref(),
        ) {
            info!("Posting to channel {channel}");
            self.start(
                &self.slack_actor_id,
                json!({ "token": token, "channel": channel, "text": text }),
            )
            .await;
        }

        if let (Some(to), Some(html), Some(subject)) = (
            self.targets.email.as_deref(),
            notification.email_message.as_deref(),
            notification.subject.as_deref(),
        ) {
            info!("Sending email to {to}");
            self.start(
                &self.email_actor_id,
                json!({ "to": to, "subject": subject, "text": "", "html": html }),
            )
            .await;
        }
    }
}
