//! Notification and logging settings.

use cadence_core::constants::DEFAULT_MAX_NOTIFICATIONS;
use cadence_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Notification retention and native delivery.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Maximum notifications kept in memory. `0` keeps everything.
    pub max_retained: usize,
    /// Whether native delivery is permitted at all.
    pub native_enabled: bool,
    /// Endpoint that receives native notifications as JSON POSTs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_retained: DEFAULT_MAX_NOTIFICATIONS,
            native_enabled: false,
            webhook_url: None,
        }
    }
}

/// Log level and format.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `"info"` or `"cadence_realtime=debug,warn"`.
    pub level: String,
    /// Output format on stderr.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
