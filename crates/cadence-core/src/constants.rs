//! Package-level constants and default timings.

use std::time::Duration;

/// Current version of the Cadence client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "cadence";

/// Fixed delay before a dropped channel reconnects.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Reconnect attempts allowed after an unexpected close before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single HTTP request, poll fetches included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed interval between status poll fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default cap on retained notifications.
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn name_is_lowercase() {
        assert_eq!(NAME, NAME.to_lowercase());
    }

    #[test]
    fn channel_timings() {
        assert_eq!(DEFAULT_RECONNECT_DELAY.as_millis(), 3000);
        assert_eq!(DEFAULT_MAX_RECONNECT_ATTEMPTS, 5);
        assert_eq!(DEFAULT_POLL_INTERVAL.as_millis(), 2000);
    }

    #[test]
    fn timeouts_bound_connect_and_requests() {
        assert_eq!(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(10));
        assert_eq!(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs(10));
    }
}
