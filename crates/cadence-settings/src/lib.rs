//! # cadence-settings
//!
//! Client settings loaded from three layers (in priority order):
//! 1. **Compiled defaults** - [`CadenceSettings::default()`]
//! 2. **User file** - `~/.cadence/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** - `CADENCE_*` overrides (highest priority)
//!
//! The settings are plain data. Each consuming crate converts the section it
//! needs into its own config type.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<CadenceSettings> = OnceLock::new();

/// Get the process-wide settings.
///
/// On first call, loads `~/.cadence/settings.json` with env var overrides.
/// If loading fails the error is logged and compiled defaults are used.
pub fn get_settings() -> &'static CadenceSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CadenceSettings::default()
        })
    })
}

/// Initialize the process-wide settings with a specific value.
///
/// Returns the value back if settings were already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: CadenceSettings) -> std::result::Result<(), CadenceSettings> {
    SETTINGS.set(settings)
}
