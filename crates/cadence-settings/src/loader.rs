//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CadenceSettings::default()`]
//! 2. If `~/.cadence/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `CADENCE_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use cadence_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CadenceSettings;

/// Resolve the path to the settings file (`~/.cadence/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cadence").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CadenceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an out-of-range value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<CadenceSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<CadenceSettings> {
    let defaults = serde_json::to_value(CadenceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CADENCE_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut CadenceSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Empty values are treated as unset. Values that fail to parse or fall
/// outside their range are logged and ignored.
pub fn apply_overrides(settings: &mut CadenceSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("CADENCE_API_URL") {
        settings.api.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = env.string("CADENCE_API_TOKEN") {
        settings.api.auth_token = Some(v);
    }
    if let Some(v) = env.u64("CADENCE_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.api.request_timeout_ms = v;
    }

    // ── Real-time channel ───────────────────────────────────────────
    if let Some(v) = env.string("CADENCE_WS_URL") {
        settings.realtime.ws_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = env.u64("CADENCE_RECONNECT_DELAY_MS", 0, 600_000) {
        settings.realtime.reconnect_delay_ms = v;
    }
    if let Some(v) = env.u32("CADENCE_MAX_RECONNECTS", 0, 1000) {
        settings.realtime.max_reconnect_attempts = v;
    }
    if let Some(v) = env.u64("CADENCE_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.realtime.connect_timeout_ms = v;
    }

    // ── Poller ──────────────────────────────────────────────────────
    if let Some(v) = env.u64("CADENCE_POLL_INTERVAL_MS", 100, 3_600_000) {
        settings.poller.interval_ms = v;
    }

    // ── Notifications ───────────────────────────────────────────────
    if let Some(v) = env.usize("CADENCE_MAX_NOTIFICATIONS", 0, 100_000) {
        settings.notifications.max_retained = v;
    }
    if let Some(v) = env.bool("CADENCE_NATIVE_NOTIFICATIONS") {
        settings.notifications.native_enabled = v;
    }
    if let Some(v) = env.string("CADENCE_WEBHOOK_URL") {
        settings.notifications.webhook_url = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CADENCE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CADENCE_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "CADENCE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number within an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.ranged(name, min, max)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.ranged(name, min, max)
    }
}
