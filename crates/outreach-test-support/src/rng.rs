//! Deterministic `DeterministicRng` implementations.

use outreach_core::rng::DeterministicRng;

/// Always returns `min` from `next_u32_range` and `0.0` from `next_f64`.
/// Pacing collapses to its lower bound and channel selection to the first
/// idle candidate.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}

/// Returns values from a predetermined sequence, clamped into the requested
/// range. Panics once the sequence is exhausted.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRng {
    /// Creates a `SequenceRng` yielding `values` in order.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        let value = self.values[self.index];
        self.index += 1;
        value.clamp(min, max.max(min))
    }

    fn next_f64(&mut self) -> f64 {
        0.0
    }
}
