//! User-visible, non-blocking notifications.
//!
//! Every network failure is caught at the component boundary and turned into
//! a notification here instead of propagating further.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationLevel::Info => write!(f, "info"),
            NotificationLevel::Warning => write!(f, "warning"),
            NotificationLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: &str, message: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(title: &str, message: &str) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: &str, message: &str) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: &str, message: &str) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

/// Fans notifications out to every subscriber (toasts, CLI output, tests).
#[derive(Clone)]
pub struct NotificationBroadcaster {
    sender: Arc<broadcast::Sender<Notification>>,
}

impl NotificationBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, notification: Notification) {
        // No active receivers is fine
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn info(&self, title: &str, message: &str) {
        self.send(Notification::info(title, message));
    }

    pub fn warn(&self, title: &str, message: &str) {
        self.send(Notification::warning(title, message));
    }

    pub fn error(&self, title: &str, message: &str) {
        self.send(Notification::error(title, message));
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
