//! Structured logging with `tracing`.
//!
//! Library crates only emit events through the `tracing` macros with
//! structured fields (`session_key`, `attempt`, `frame_type`, ...). The binary
//! installs a subscriber once at startup via [`init_subscriber`].
//!
//! [`capture_logs`] installs a thread-local capture layer so tests can
//! assert on what was logged.

pub mod test_utils;

use serde::{Deserialize, Serialize};

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Output format of the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Build the level filter. `RUST_LOG` takes priority over `level`.
fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum level (or full filter directive), e.g. `"info"` or
///   `"cadence_realtime=debug,warn"`.
/// * `format` - Compact text or JSON lines.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
