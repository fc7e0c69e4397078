//! Live per-campaign progress counters.
//!
//! The aggregator is seeded from the persisted outcomes when a worker starts
//! and then counts each outcome as the worker persists it, so reads never
//! have to replay the event stream.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use outreach_campaign::domain::outcome::{CampaignProgress, DispatchOutcome};
use uuid::Uuid;

/// In-memory progress for every campaign the engine has touched.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    campaigns: Mutex<HashMap<Uuid, CampaignProgress>>,
}

impl ProgressAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, CampaignProgress>> {
        self.campaigns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs progress derived from persisted outcomes. An existing entry
    /// that has already counted more is kept, so counters never go back.
    pub fn seed(&self, campaign_id: Uuid, progress: CampaignProgress) {
        let mut campaigns = self.lock();
        match campaigns.get(&campaign_id) {
            Some(current) if current.completed_calls > progress.completed_calls => {}
            _ => {
                campaigns.insert(campaign_id, progress);
            }
        }
    }

    /// Counts one terminal outcome. Returns `false` if the campaign was never
    /// seeded.
    pub fn record_outcome(&self, campaign_id: Uuid, outcome: DispatchOutcome) -> bool {
        match self.lock().get_mut(&campaign_id) {
            Some(progress) => {
                progress.record(outcome);
                true
            }
            None => false,
        }
    }

    /// Returns the current counters.
    #[must_use]
    pub fn snapshot(&self, campaign_id: Uuid) -> Option<CampaignProgress> {
        self.lock().get(&campaign_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome_updates_snapshot() {
        let aggregator = ProgressAggregator::new();
        let campaign_id = Uuid::new_v4();
        aggregator.seed(campaign_id, CampaignProgress::new(4));

        aggregator.record_outcome(campaign_id, DispatchOutcome::Answered);
        aggregator.record_outcome(campaign_id, DispatchOutcome::NotAnswered);

        let snapshot = aggregator.snapshot(campaign_id).unwrap();
        assert_eq!(snapshot.completed_calls, 2);
        assert_eq!(snapshot.answer_rate, 50);
        assert_eq!(snapshot.percent_complete, 50);
    }

    #[test]
    fn test_record_outcome_for_unknown_campaign_is_ignored() {
        let aggregator = ProgressAggregator::new();

        assert!(!aggregator.record_outcome(Uuid::new_v4(), DispatchOutcome::Delivered));
    }

    #[test]
    fn test_seed_never_moves_counters_backwards() {
        let aggregator = ProgressAggregator::new();
        let campaign_id = Uuid::new_v4();
        aggregator.seed(
            campaign_id,
            CampaignProgress::from_outcomes(3, [DispatchOutcome::Delivered; 2]),
        );

        aggregator.seed(campaign_id, CampaignProgress::new(3));

        assert_eq!(aggregator.snapshot(campaign_id).unwrap().completed_calls, 2);
    }
}
