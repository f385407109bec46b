//! Notification data types.

use std::sync::Arc;

use cadence_core::{NotificationId, SessionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// An operation finished successfully.
    Success,
    /// An operation failed.
    Error,
    /// Neutral information.
    Info,
    /// Something needs attention but did not fail.
    Warning,
}

impl NotificationKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
            Self::Warning => "warning",
        }
    }
}

/// A stored user-facing notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique ID assigned by the sink.
    pub id: NotificationId,
    /// Severity.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// When the sink accepted the notification.
    pub created_at: DateTime<Utc>,
    /// Whether the user has seen it.
    pub is_read: bool,
    /// Conversation the notification is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<SessionKey>,
    /// In-app route to open when the notification is activated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// A notification before the sink assigns its ID and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewNotification {
    /// Severity.
    pub kind: NotificationKind,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Conversation the notification is about.
    pub conversation_id: Option<SessionKey>,
    /// In-app route to open when activated.
    pub link: Option<String>,
}

impl NewNotification {
    /// Create a notification of the given kind.
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            conversation_id: None,
            link: None,
        }
    }

    /// Shorthand for [`NotificationKind::Success`].
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, message)
    }

    /// Shorthand for [`NotificationKind::Error`].
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, message)
    }

    /// Shorthand for [`NotificationKind::Info`].
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, message)
    }

    /// Shorthand for [`NotificationKind::Warning`].
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Warning, title, message)
    }

    /// Attach the conversation this notification refers to.
    #[must_use]
    pub fn for_conversation(mut self, conversation_id: SessionKey) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Attach an in-app link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub(crate) fn into_notification(self, id: NotificationId) -> Notification {
        Notification {
            id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            created_at: Utc::now(),
            is_read: false,
            conversation_id: self.conversation_id,
            link: self.link,
        }
    }
}

/// Immutable view of the sink published after every mutation.
#[derive(Clone, Debug, Default)]
pub struct NotificationSnapshot {
    /// Entries, newest first.
    pub items: Arc<[Notification]>,
    /// Number of entries with `is_read == false`.
    pub unread_count: usize,
}
