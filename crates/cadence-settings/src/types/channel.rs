//! HTTP API, real-time channel and poller settings.

use std::time::Duration;

use cadence_core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECONNECT_DELAY, DEFAULT_REQUEST_TIMEOUT,
};
use serde::{Deserialize, Serialize};

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// HTTP API access.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL of the REST API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Bearer token sent with every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            request_timeout_ms: millis(DEFAULT_REQUEST_TIMEOUT),
            auth_token: None,
        }
    }
}

impl ApiSettings {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Real-time channel behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// WebSocket base URL. The session key is appended as the last path segment.
    pub ws_url: String,
    /// Fixed delay before reconnecting after an unexpected close, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Reconnects allowed before the channel stays disconnected.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single connect attempt, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/ws".to_string(),
            reconnect_delay_ms: millis(DEFAULT_RECONNECT_DELAY),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout_ms: millis(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl RealtimeSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Status poller behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollerSettings {
    /// Fixed interval between fetches, in milliseconds.
    pub interval_ms: u64,
    /// Status values after which polling stops.
    pub terminal_states: Vec<String>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: millis(DEFAULT_POLL_INTERVAL),
            terminal_states: vec!["ready".into(), "completed".into(), "failed".into()],
        }
    }
}

impl PollerSettings {
    /// Poll interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_defaults() {
        let s = RealtimeSettings::default();
        assert_eq!(s.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(s.max_reconnect_attempts, 5);
        assert_eq!(s.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn poller_defaults() {
        let s = PollerSettings::default();
        assert_eq!(s.interval(), Duration::from_secs(2));
        assert_eq!(s.terminal_states, vec!["ready", "completed", "failed"]);
    }

    #[test]
    fn api_partial_json() {
        let s: ApiSettings =
            serde_json::from_str(r#"{"baseUrl": "https://api.example.com"}"#).unwrap();
        assert_eq!(s.base_url, "https://api.example.com");
        assert_eq!(s.request_timeout(), Duration::from_secs(10));
        assert!(s.auth_token.is_none());
    }

    #[test]
    fn auth_token_omitted_when_unset() {
        let json = serde_json::to_value(ApiSettings::default()).unwrap();
        assert!(json.get("authToken").is_none());
    }
}
