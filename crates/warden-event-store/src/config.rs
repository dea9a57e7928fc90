//! Event store configuration.

use std::time::Duration;

use serde::Deserialize;

/// Retry knobs for the push transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventStoreConfig {
    /// How many times a push transaction runs before a transient backend
    /// failure is reported.
    pub max_push_attempts: u32,
    /// Base backoff between attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            max_push_attempts: 5,
            retry_backoff_ms: 10,
        }
    }
}

impl EventStoreConfig {
    /// Delay before the attempt following `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}
