//! Aggregate roots for the Campaign context.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use outreach_core::aggregate::AggregateRoot;
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use outreach_core::event::EventMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::CampaignDefinition;
use super::events::{
    CampaignCancelled, CampaignCompleted, CampaignCreated, CampaignEvent, CampaignEventKind,
    CampaignFailed, CampaignPaused, CampaignResumed, CampaignScheduled, CampaignStarted,
    DispatchRecorded,
};
use super::outcome::{CampaignProgress, DispatchRecord, TaskResolution};

/// Lifecycle state of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    /// Created, not yet started.
    Draft,
    /// Waiting for `scheduled_at`.
    Scheduled,
    /// Dispatching.
    Running,
    /// Dispatch frozen by an operator.
    Paused,
    /// Every recipient processed.
    Completed,
    /// Gave up because no channel could be used.
    Failed,
    /// Stopped by an operator.
    Cancelled,
}

impl CampaignStatus {
    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The aggregate root for a campaign.
#[derive(Debug)]
pub struct Campaign {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// Definition, present once created.
    definition: Option<CampaignDefinition>,
    /// Lifecycle state.
    status: CampaignStatus,
    /// First transition into `running`.
    started_at: Option<DateTime<Utc>>,
    /// Transition into a terminal state.
    finished_at: Option<DateTime<Utc>>,
    /// Why the campaign failed, if it did.
    failure_reason: Option<String>,
    /// Terminal outcomes keyed by recipient index.
    records: BTreeMap<usize, DispatchRecord>,
    /// Counters derived from `records`.
    progress: CampaignProgress,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<CampaignEvent>,
}

impl Campaign {
    /// Creates an empty campaign aggregate (before the `CampaignCreated` event).
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            definition: None,
            status: CampaignStatus::Draft,
            started_at: None,
            finished_at: None,
            failure_reason: None,
            records: BTreeMap::new(),
            progress: CampaignProgress::default(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn status(&self) -> CampaignStatus {
        self.status
    }

    /// Returns the definition, if the campaign has been created.
    #[must_use]
    pub fn definition(&self) -> Option<&CampaignDefinition> {
        self.definition.as_ref()
    }

    /// Returns the scheduled start time, if any.
    #[must_use]
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.definition.as_ref().and_then(|d| d.scheduled_at)
    }

    /// Returns when the campaign first started running.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns when the campaign reached a terminal state.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the recorded failure reason.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns all persisted outcomes, ordered by recipient index.
    #[must_use]
    pub fn records(&self) -> &BTreeMap<usize, DispatchRecord> {
        &self.records
    }

    /// Returns `true` if the recipient already has a terminal outcome.
    #[must_use]
    pub fn is_recorded(&self, recipient_index: usize) -> bool {
        self.records.contains_key(&recipient_index)
    }

    /// Returns progress derived from persisted outcomes.
    #[must_use]
    pub fn progress(&self) -> CampaignProgress {
        self.progress
    }

    /// Returns the next sequence number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn raise(&mut self, kind: CampaignEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let metadata = EventMetadata::new(
            kind.event_type(),
            self.id,
            self.next_sequence_number(),
            correlation_id,
            clock.now(),
        );
        self.uncommitted_events.push(CampaignEvent { metadata, kind });
    }

    fn require_definition(&self) -> Result<&CampaignDefinition, DomainError> {
        self.definition
            .as_ref()
            .ok_or(DomainError::AggregateNotFound(self.id))
    }

    fn invalid(&self, action: &str) -> DomainError {
        DomainError::InvalidTransition(format!(
            "cannot {action} campaign {} while {}",
            self.id, self.status
        ))
    }

    /// Creates the campaign, producing `CampaignCreated` and, when
    /// `scheduled_at` lies in the future, `CampaignScheduled`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the definition is invalid or the
    /// campaign already exists.
    pub fn create(
        &mut self,
        definition: CampaignDefinition,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.definition.is_some() || !self.uncommitted_events.is_empty() {
            return Err(DomainError::Validation(format!(
                "campaign {} already exists",
                self.id
            )));
        }
        definition.validate()?;
        let scheduled_at = definition.scheduled_at.filter(|at| !clock.has_reached(*at));
        self.raise(
            CampaignEventKind::CampaignCreated(CampaignCreated {
                campaign_id: self.id,
                definition,
            }),
            correlation_id,
            clock,
        );
        if let Some(scheduled_at) = scheduled_at {
            self.raise(
                CampaignEventKind::CampaignScheduled(CampaignScheduled {
                    campaign_id: self.id,
                    scheduled_at,
                }),
                correlation_id,
                clock,
            );
        }
        Ok(())
    }

    /// Starts a draft campaign: `draft → scheduled` when `scheduled_at` is
    /// still ahead, `draft → running` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the campaign is a draft.
    pub fn start(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        let scheduled_at = self.require_definition()?.scheduled_at;
        if self.status != CampaignStatus::Draft {
            return Err(self.invalid("start"));
        }
        match scheduled_at {
            Some(at) if !clock.has_reached(at) => self.raise(
                CampaignEventKind::CampaignScheduled(CampaignScheduled {
                    campaign_id: self.id,
                    scheduled_at: at,
                }),
                correlation_id,
                clock,
            ),
            _ => self.raise(
                CampaignEventKind::CampaignStarted(CampaignStarted {
                    campaign_id: self.id,
                }),
                correlation_id,
                clock,
            ),
        }
        Ok(())
    }

    /// Moves a due scheduled campaign to `running`. Returns `false` without
    /// producing events if the campaign is already running.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the start time has not been
    /// reached, `DomainError::InvalidTransition` from any other state.
    pub fn activate(
        &mut self,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<bool, DomainError> {
        let scheduled_at = self.require_definition()?.scheduled_at;
        match self.status {
            CampaignStatus::Running => Ok(false),
            CampaignStatus::Scheduled => {
                if let Some(at) = scheduled_at.filter(|at| !clock.has_reached(*at)) {
                    return Err(DomainError::Validation(format!(
                        "campaign {} is scheduled for {at}; too early to run",
                        self.id
                    )));
                }
                self.raise(
                    CampaignEventKind::CampaignStarted(CampaignStarted {
                        campaign_id: self.id,
                    }),
                    correlation_id,
                    clock,
                );
                Ok(true)
            }
            _ => Err(self.invalid("activate")),
        }
    }

    /// Pauses a running campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the campaign is running.
    pub fn pause(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require_definition()?;
        if self.status != CampaignStatus::Running {
            return Err(self.invalid("pause"));
        }
        self.raise(
            CampaignEventKind::CampaignPaused(CampaignPaused {
                campaign_id: self.id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Resumes a paused campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the campaign is paused.
    pub fn resume(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require_definition()?;
        if self.status != CampaignStatus::Paused {
            return Err(self.invalid("resume"));
        }
        self.raise(
            CampaignEventKind::CampaignResumed(CampaignResumed {
                campaign_id: self.id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Cancels a scheduled, running or paused campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` from any other state.
    pub fn cancel(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        self.require_definition()?;
        if !matches!(
            self.status,
            CampaignStatus::Scheduled | CampaignStatus::Running | CampaignStatus::Paused
        ) {
            return Err(self.invalid("cancel"));
        }
        self.raise(
            CampaignEventKind::CampaignCancelled(CampaignCancelled {
                campaign_id: self.id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records the terminal outcome of one recipient.
    ///
    /// Accepted while running, paused or cancelled, since an in-flight task
    /// always finishes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the index is out of range, the
    /// outcome is not terminal, or the recipient already has an outcome;
    /// `DomainError::InvalidTransition` in any other state.
    pub fn record_dispatch(
        &mut self,
        resolution: TaskResolution,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let definition = self.require_definition()?;
        let Some(recipient) = definition.recipients.get(resolution.recipient_index) else {
            return Err(DomainError::Validation(format!(
                "recipient index {} out of range for campaign {}",
                resolution.recipient_index, self.id
            )));
        };
        let recipient_id = recipient.id;
        if !matches!(
            self.status,
            CampaignStatus::Running | CampaignStatus::Paused | CampaignStatus::Cancelled
        ) {
            return Err(self.invalid("record a dispatch for"));
        }
        if !resolution.outcome.is_terminal() {
            return Err(DomainError::Validation(
                "only terminal outcomes are recorded".into(),
            ));
        }
        let already_pending = self.uncommitted_events.iter().any(|e| {
            matches!(&e.kind, CampaignEventKind::DispatchRecorded(d)
                if d.record.recipient_index == resolution.recipient_index)
        });
        if self.is_recorded(resolution.recipient_index) || already_pending {
            return Err(DomainError::Validation(format!(
                "recipient {} of campaign {} already has an outcome",
                resolution.recipient_index, self.id
            )));
        }
        let record = DispatchRecord {
            recipient_index: resolution.recipient_index,
            recipient_id,
            channel_id: resolution.channel_id,
            outcome: resolution.outcome,
            attempts: resolution.attempts,
            reason: resolution.reason,
            recorded_at: clock.now(),
        };
        self.raise(
            CampaignEventKind::DispatchRecorded(DispatchRecorded {
                campaign_id: self.id,
                record,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Completes a running campaign whose recipients all have outcomes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless running, or
    /// `DomainError::Validation` while recipients remain unprocessed.
    pub fn complete(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        let total = self.require_definition()?.total_contacts();
        if self.status != CampaignStatus::Running {
            return Err(self.invalid("complete"));
        }
        if self.records.len() < total {
            return Err(DomainError::Validation(format!(
                "campaign {} still has {} unprocessed recipients",
                self.id,
                total - self.records.len()
            )));
        }
        self.raise(
            CampaignEventKind::CampaignCompleted(CampaignCompleted {
                campaign_id: self.id,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Fails a running or paused campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` from any other state, or
    /// `DomainError::Validation` if `reason` is blank.
    pub fn fail(
        &mut self,
        reason: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.require_definition()?;
        if !matches!(self.status, CampaignStatus::Running | CampaignStatus::Paused) {
            return Err(self.invalid("fail"));
        }
        if reason.trim().is_empty() {
            return Err(DomainError::Validation("failure reason must not be empty".into()));
        }
        self.raise(
            CampaignEventKind::CampaignFailed(CampaignFailed {
                campaign_id: self.id,
                reason: reason.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }
}

impl AggregateRoot for Campaign {
    type Event = CampaignEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        let occurred_at = event.metadata.occurred_at;
        match &event.kind {
            CampaignEventKind::CampaignCreated(payload) => {
                self.progress = CampaignProgress::new(payload.definition.total_contacts());
                self.definition = Some(payload.definition.clone());
                self.status = CampaignStatus::Draft;
            }
            CampaignEventKind::CampaignScheduled(_) => {
                self.status = CampaignStatus::Scheduled;
            }
            CampaignEventKind::CampaignStarted(_) => {
                self.status = CampaignStatus::Running;
                self.started_at.get_or_insert(occurred_at);
            }
            CampaignEventKind::CampaignPaused(_) => {
                self.status = CampaignStatus::Paused;
            }
            CampaignEventKind::CampaignResumed(_) => {
                self.status = CampaignStatus::Running;
            }
            CampaignEventKind::CampaignCancelled(_) => {
                self.status = CampaignStatus::Cancelled;
                self.finished_at = Some(occurred_at);
            }
            CampaignEventKind::DispatchRecorded(payload) => {
                let record = &payload.record;
                if !self.records.contains_key(&record.recipient_index) {
                    self.progress.record(record.outcome);
                    self.records.insert(record.recipient_index, record.clone());
                }
            }
            CampaignEventKind::CampaignCompleted(_) => {
                self.status = CampaignStatus::Completed;
                self.finished_at = Some(occurred_at);
            }
            CampaignEventKind::CampaignFailed(payload) => {
                self.status = CampaignStatus::Failed;
                self.failure_reason = Some(payload.reason.clone());
                self.finished_at = Some(occurred_at);
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}
