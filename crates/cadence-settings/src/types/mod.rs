//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`: a partial
//! JSON file only needs the keys it changes.

mod channel;
mod client;

pub use channel::*;
pub use client::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the Cadence client.
///
/// ```json
/// {
///   "api": { "baseUrl": "https://api.example.com" },
///   "realtime": { "maxReconnectAttempts": 3 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CadenceSettings {
    /// HTTP API access.
    pub api: ApiSettings,
    /// Real-time channel behavior.
    pub realtime: RealtimeSettings,
    /// Status poller behavior.
    pub poller: PollerSettings,
    /// Notification retention and native delivery.
    pub notifications: NotificationSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

/// Status names the analysis backend reports.
pub const ANALYSIS_STATUSES: [&str; 5] = ["queued", "processing", "ready", "completed", "failed"];

impl CadenceSettings {
    /// Reject values that would make the client spin or never connect.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("api.baseUrl is empty".into()));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "api.requestTimeoutMs must be > 0".into(),
            ));
        }
        if self.realtime.ws_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("realtime.wsUrl is empty".into()));
        }
        if self.realtime.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.connectTimeoutMs must be > 0".into(),
            ));
        }
        if self.poller.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "poller.intervalMs must be > 0".into(),
            ));
        }
        if self.poller.terminal_states.is_empty() {
            return Err(SettingsError::InvalidValue(
                "poller.terminalStates must not be empty".into(),
            ));
        }
        if let Some(name) = self
            .poller
            .terminal_states
            .iter()
            .find(|name| !ANALYSIS_STATUSES.contains(&name.trim().to_ascii_lowercase().as_str()))
        {
            return Err(SettingsError::InvalidValue(format!(
                "poller.terminalStates: unknown status {name:?}"
            )));
        }
        Ok(())
    }
}
