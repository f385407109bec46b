//! Notification delivery errors.

use thiserror::Error;

/// Failures of the native delivery side channel.
///
/// These never reach callers of [`NotificationSink::add`](crate::NotificationSink::add);
/// the sink logs them and moves on.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The payload could not be serialized.
    #[error("failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The delivery endpoint could not be reached or rejected the request.
    #[error("notification delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    /// No async runtime is available to run the delivery.
    #[error("no async runtime available for native delivery")]
    NoRuntime,
    /// Delivery was refused by the platform.
    #[error("native delivery refused: {0}")]
    Refused(String),
}

/// Result type for notification delivery.
pub type Result<T> = std::result::Result<T, NotifyError>;
