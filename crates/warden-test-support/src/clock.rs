//! Deterministic `Clock` implementation for tests.

use chrono::{DateTime, TimeZone, Utc};
use warden_core::clock::Clock;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// The instant most tests pin time to: 2026-01-15 10:00:00 UTC.
    ///
    /// # Panics
    ///
    /// Never; the date is a valid constant.
    #[must_use]
    pub fn reference() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
