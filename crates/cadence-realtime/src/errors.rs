//! Real-time channel errors.

use std::time::Duration;

use cadence_core::SessionKey;
use thiserror::Error;

/// Errors raised by the connection layer.
///
/// Transport failures inside a worker never surface here. The worker turns
/// them into state transitions. These errors are returned to callers of
/// explicit operations such as [`send`](crate::ConnectionManager::send).
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// WebSocket handshake or I/O failure.
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// A connect attempt did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The endpoint URL could not be built for a key.
    #[error("invalid endpoint for {key}: {reason}")]
    InvalidEndpoint {
        /// Session key the URL was built for.
        key: SessionKey,
        /// What was wrong with it.
        reason: String,
    },

    /// No channel is open for the key.
    #[error("no open channel for {0}")]
    NotOpen(SessionKey),

    /// The channel exists but its transport is not connected.
    #[error("channel {0} is not connected")]
    NotConnected(SessionKey),

    /// An outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The transport was closed while an operation was in flight.
    #[error("transport closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Result type for the real-time channel.
pub type Result<T> = std::result::Result<T, RealtimeError>;
