//! Native (OS-level or push) delivery of notifications.
//!
//! Native delivery is an enhancement: the sink works the same whether or
//! not permission was granted. Implementations must return quickly and do
//! their I/O in the background.

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{NotifyError, Result};
use crate::types::Notification;

/// Whether the environment allows native notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    /// The user allowed native notifications.
    Granted,
    /// The user refused native notifications.
    Denied,
    /// The user has not been asked.
    NotDetermined,
}

/// A side channel that surfaces notifications outside the application.
pub trait NativeNotifier: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> Permission;

    /// Start delivering `notification`. Must not block.
    fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Notifier used when no native channel is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl NativeNotifier for NoopNotifier {
    fn permission(&self) -> Permission {
        Permission::NotDetermined
    }

    fn deliver(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link: Option<&'a str>,
}

/// Posts each notification as JSON to a webhook (desktop bridge, push relay).
///
/// The POST runs on a spawned task. Non-2xx responses and transport errors
/// are logged at `warn`.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
    permission: Permission,
}

impl WebhookNotifier {
    /// Create a notifier for `url` with permission granted.
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            permission: Permission::Granted,
        }
    }

    /// Override the permission state.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl NativeNotifier for WebhookNotifier {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn deliver(&self, notification: &Notification) -> Result<()> {
        let body = serde_json::to_vec(&WebhookPayload {
            id: notification.id.as_str(),
            kind: notification.kind.as_str(),
            title: &notification.title,
            body: &notification.message,
            conversation_id: notification.conversation_id.as_deref(),
            link: notification.link.as_deref(),
        })?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;
        let request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let id = notification.id.clone();

        let _ = runtime.spawn(async move {
            match request.send().await.and_then(reqwest::Response::error_for_status) {
                Ok(_) => debug!(notification_id = %id, "native notification delivered"),
                Err(e) => warn!(notification_id = %id, error = %e, "native notification failed"),
            }
        });
        Ok(())
    }
}
