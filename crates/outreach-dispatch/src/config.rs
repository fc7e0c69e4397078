//! Tunables for the dispatch worker loop and scheduling trigger.

use std::time::Duration;

/// Retry and back-off settings shared by every worker.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Driver invocations allowed per recipient on retryable errors.
    pub max_attempts: u32,
    /// First wait after the pool reports every candidate busy.
    pub busy_backoff: Duration,
    /// Ceiling for the doubling busy back-off.
    pub busy_backoff_max: Duration,
    /// Wait between acquisitions while every candidate is disconnected.
    pub exhausted_backoff: Duration,
    /// Consecutive "unavailable" acquisitions tolerated before the campaign
    /// fails with `channels exhausted`.
    pub exhausted_retries: u32,
    /// How often the scheduling trigger looks for due campaigns.
    pub scheduler_poll: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            busy_backoff: Duration::from_millis(50),
            busy_backoff_max: Duration::from_secs(2),
            exhausted_backoff: Duration::from_secs(10),
            exhausted_retries: 30,
            scheduler_poll: Duration::from_secs(1),
        }
    }
}
