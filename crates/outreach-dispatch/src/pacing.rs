//! Pacing policy: the jittered delay between two dispatches on one channel.

use std::time::Duration;

use outreach_campaign::domain::definition::Pacing;
use outreach_core::rng::DeterministicRng;

/// Draws the delay to wait since the previous dispatch on the same channel.
///
/// Uniform over `[min_interval_ms, max_interval_ms]`, one independent draw
/// per call. Equal bounds give a constant delay.
#[must_use]
pub fn next_delay(pacing: &Pacing, rng: &mut dyn DeterministicRng) -> Duration {
    if pacing.min_interval_ms >= pacing.max_interval_ms {
        return Duration::from_millis(u64::from(pacing.min_interval_ms));
    }
    let millis = rng.next_u32_range(pacing.min_interval_ms, pacing.max_interval_ms);
    Duration::from_millis(u64::from(millis))
}
