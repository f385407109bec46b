//! Connection state and the events the manager publishes.

use std::fmt;

use cadence_core::SessionKey;
use serde::Serialize;

/// Lifecycle state of one session's channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport, and none being opened.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// The transport reported an error. A close follows.
    Error,
}

impl ConnectionState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something observable happened on a channel.
///
/// All events for all keys share one ordered queue. Events for a key stop
/// once [`close`](super::ConnectionManager::close) returns.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// The key moved to a new state.
    StateChanged {
        /// Channel.
        key: SessionKey,
        /// New state.
        state: ConnectionState,
    },
    /// A text frame arrived.
    Frame {
        /// Channel.
        key: SessionKey,
        /// Raw frame text.
        text: String,
    },
}

impl ChannelEvent {
    /// Channel the event belongs to.
    pub fn key(&self) -> &SessionKey {
        match self {
            Self::StateChanged { key, .. } | Self::Frame { key, .. } => key,
        }
    }
}
