//! User-visible notices.
//!
//! Wallet and contract workflows report outcomes as notices instead of
//! printing or panicking; front-ends subscribe and render them however they
//! like. Each level carries its own display policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Severity/kind of a notice.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    /// Long-running operation in progress (e.g. waiting for consensus).
    Loading,
    /// The user declined a wallet prompt. Informational, not an error.
    Cancelled,
    /// Required configuration is missing. Stays until dismissed.
    ConfigError,
}

impl NoticeLevel {
    /// How long the notice stays visible. `None` means until dismissed.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Success => Some(Duration::from_millis(4_000)),
            Self::Error => Some(Duration::from_millis(7_000)),
            Self::Warning => Some(Duration::from_millis(5_000)),
            Self::Cancelled => Some(Duration::from_millis(2_500)),
            Self::Loading | Self::ConfigError => None,
        }
    }

    /// Whether a close button is offered.
    pub fn dismissable(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Call-to-action attached to a notice.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NoticeAction {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<NoticeAction>,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.into(),
            description: None,
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_action(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.action = Some(NoticeAction {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.level.duration()
    }

    pub fn dismissable(&self) -> bool {
        self.level.dismissable()
    }
}

/// Fan-out point for notices.
///
/// Cloning shares the same channel. Publishing without subscribers is not an
/// error; the notice is simply dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notice: Notice) -> Notice {
        tracing::debug!(level = ?notice.level, title = %notice.title, "notice");
        let _ = self.tx.send(notice.clone());
        notice
    }

    pub fn success(&self, title: &str, description: Option<&str>) -> Notice {
        self.publish(with_optional_description(
            Notice::new(NoticeLevel::Success, title),
            description,
        ))
    }

    pub fn error(&self, title: &str, description: Option<&str>) -> Notice {
        self.publish(with_optional_description(
            Notice::new(NoticeLevel::Error, title),
            description,
        ))
    }

    pub fn warning(&self, title: &str, description: Option<&str>) -> Notice {
        self.publish(with_optional_description(
            Notice::new(NoticeLevel::Warning, title),
            description,
        ))
    }

    pub fn loading(&self, title: &str) -> Notice {
        self.publish(Notice::new(NoticeLevel::Loading, title))
    }

    pub fn cancelled(&self, title: &str) -> Notice {
        self.publish(Notice::new(NoticeLevel::Cancelled, title))
    }

    pub fn config_error(
        &self,
        title: &str,
        description: &str,
        action: Option<NoticeAction>,
    ) -> Notice {
        let mut notice = Notice::new(NoticeLevel::ConfigError, title).with_description(description);
        notice.action = action;
        self.publish(notice)
    }
}

fn with_optional_description(notice: Notice, description: Option<&str>) -> Notice {
    match description {
        Some(d) => notice.with_description(d),
        None => notice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_policies() {
        assert_eq!(
            NoticeLevel::Cancelled.duration(),
            Some(Duration::from_millis(2_500))
        );
        assert!(!NoticeLevel::Cancelled.dismissable());
        assert_eq!(NoticeLevel::ConfigError.duration(), None);
        assert!(NoticeLevel::ConfigError.dismissable());
        assert_eq!(
            NoticeLevel::Error.duration(),
            Some(Duration::from_millis(7_000))
        );
    }

    #[tokio::test]
    async fn test_publishes_to_subscribers() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.error("Arbiter Login Failed", Some("boom"));
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.title, "Arbiter Login Failed");
        assert_eq!(notice.description.as_deref(), Some("boom"));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let notifier = Notifier::new();
        let notice = notifier.cancelled("Connection cancelled");
        assert_eq!(notice.level, NoticeLevel::Cancelled);
    }

    #[test]
    fn test_config_error_serializes_action() {
        let notifier = Notifier::new();
        let notice = notifier.config_error(
            "Setup Required",
            "Moderation contract address not configured in .env file.",
            Some(NoticeAction {
                label: "Studio".to_string(),
                url: "https://studio.genlayer.com".to_string(),
            }),
        );
        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["level"], "config_error");
        assert_eq!(value["action"]["label"], "Studio");
    }
}
