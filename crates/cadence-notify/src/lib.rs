//! # cadence-notify
//!
//! The notification sink: a single ordered list of user-facing
//! notifications with a derived unread count, plus optional native
//! delivery through a [`NativeNotifier`].
//!
//! The sink is shared as `Arc<NotificationSink>` by every producer
//! (channel hub, status watchers, CLI).

#![deny(unsafe_code)]

pub mod errors;
pub mod native;
pub mod sink;
pub mod types;

pub use errors::{NotifyError, Result};
pub use native::{NativeNotifier, NoopNotifier, Permission, WebhookNotifier};
pub use sink::NotificationSink;
pub use types::{NewNotification, Notification, NotificationKind, NotificationSnapshot};
