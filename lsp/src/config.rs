//! Session tuning knobs.

use std::time::Duration;

use serde::Deserialize;

use crate::debounce::DEFAULT_DEBOUNCE;
use crate::watchdog::DEFAULT_WATCH_INTERVAL;

/// Timing configuration for a session.
///
/// Deserializes from the `[session]` table of the user config; missing keys
/// keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period before a document change is forwarded to the project.
    pub debounce_ms: u64,
    /// Parent-process liveness probe interval.
    pub watchdog_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            watchdog_interval_secs: DEFAULT_WATCH_INTERVAL.as_secs(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Clamped to at least one second.
    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }
}
