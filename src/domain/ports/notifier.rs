//! Notifier port - chat and email delivery.

use async_trait::async_trait;

/// Rendered notification content. Empty fields are not delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    /// Slack markdown
    pub slack_message: Option<String>,
    /// Email HTML
    pub email_message: Option<String>,
    /// Email subject
    pub subject: Option<String>,
}

/// Delivery never fails the caller; implementations log and swallow
/// their own errors.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver to every configured channel.
    async fn notify(&self, notification: &Notification);
}
