//! Per-recipient dispatch outcomes and the progress derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one dispatch task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Not processed yet.
    Pending,
    /// Message accepted by the provider.
    Delivered,
    /// Call answered by the recipient.
    Answered,
    /// Call placed but not answered.
    NotAnswered,
    /// Delivery failed permanently or after exhausting retries.
    Failed,
    /// Recipient was invalid and never dispatched.
    Skipped,
}

impl DispatchOutcome {
    /// Returns `true` for every outcome except `Pending`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Terminal outcome persisted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Position of the recipient in the campaign's list.
    pub recipient_index: usize,
    /// Recipient identifier.
    pub recipient_id: Uuid,
    /// Channel used for the final attempt, if any was acquired.
    pub channel_id: Option<Uuid>,
    /// Terminal outcome.
    pub outcome: DispatchOutcome,
    /// Number of driver invocations made for this recipient.
    pub attempts: u32,
    /// Human-readable detail (driver detail or failure cause).
    pub reason: Option<String>,
    /// When the outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A terminal outcome reported by the dispatch worker, before it is stamped
/// with the recipient id and recording time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResolution {
    /// Position of the recipient in the campaign's list.
    pub recipient_index: usize,
    /// Channel used for the final attempt.
    pub channel_id: Option<Uuid>,
    /// Terminal outcome.
    pub outcome: DispatchOutcome,
    /// Number of driver invocations made.
    pub attempts: u32,
    /// Optional detail.
    pub reason: Option<String>,
}

/// Live counters for a campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignProgress {
    /// Recipients in the campaign.
    pub total_contacts: usize,
    /// Messages delivered.
    pub sent: usize,
    /// Calls answered.
    pub answered: usize,
    /// Calls not answered.
    pub not_answered: usize,
    /// Failed dispatches.
    pub failed: usize,
    /// Skipped recipients.
    pub skipped: usize,
    /// Sum of all terminal outcomes.
    pub completed_calls: usize,
    /// `completed_calls / total_contacts`, as a rounded percentage.
    pub percent_complete: u32,
    /// `answered / completed_calls`, as a rounded percentage.
    pub answer_rate: u32,
}

impl CampaignProgress {
    /// Empty progress for a campaign of `total_contacts` recipients.
    #[must_use]
    pub fn new(total_contacts: usize) -> Self {
        Self {
            total_contacts,
            ..Self::default()
        }
    }

    /// Recomputes progress from a set of recorded outcomes.
    #[must_use]
    pub fn from_outcomes<I>(total_contacts: usize, outcomes: I) -> Self
    where
        I: IntoIterator<Item = DispatchOutcome>,
    {
        let mut progress = Self::new(total_contacts);
        for outcome in outcomes {
            progress.record(outcome);
        }
        progress
    }

    /// Counts one terminal outcome. `Pending` is ignored.
    pub fn record(&mut self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Pending => return,
            DispatchOutcome::Delivered => &mut self.sent,
            DispatchOutcome::Answered => &mut self.answered,
            DispatchOutcome::NotAnswered => &mut self.not_answered,
            DispatchOutcome::Failed => &mut self.failed,
            DispatchOutcome::Skipped => &mut self.skipped,
        };
        *counter += 1;
        self.completed_calls += 1;
        self.percent_complete = rounded_percent(self.completed_calls, self.total_contacts);
        self.answer_rate = rounded_percent(self.answered, self.completed_calls);
    }

    /// Returns `true` once every recipient has a terminal outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.completed_calls >= self.total_contacts
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn rounded_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}
