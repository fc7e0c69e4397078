//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time.
///
/// Scheduling decisions (`scheduled_at` guards, event timestamps) go through
/// this trait so tests can pin or step the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns `true` once the current time is at or past `instant`.
    fn has_reached(&self, instant: DateTime<Utc>) -> bool {
        self.now() >= instant
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
