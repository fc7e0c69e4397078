//! Domain events for the Campaign context.

use chrono::{DateTime, Utc};
use outreach_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::CampaignDefinition;
use super::outcome::DispatchRecord;

/// Event type for `CampaignCreated`.
pub const CAMPAIGN_CREATED_EVENT_TYPE: &str = "campaign.created";
/// Event type for `CampaignScheduled`.
pub const CAMPAIGN_SCHEDULED_EVENT_TYPE: &str = "campaign.scheduled";
/// Event type for `CampaignStarted`.
pub const CAMPAIGN_STARTED_EVENT_TYPE: &str = "campaign.started";
/// Event type for `CampaignPaused`.
pub const CAMPAIGN_PAUSED_EVENT_TYPE: &str = "campaign.paused";
/// Event type for `CampaignResumed`.
pub const CAMPAIGN_RESUMED_EVENT_TYPE: &str = "campaign.resumed";
/// Event type for `CampaignCancelled`.
pub const CAMPAIGN_CANCELLED_EVENT_TYPE: &str = "campaign.cancelled";
/// Event type for `DispatchRecorded`.
pub const DISPATCH_RECORDED_EVENT_TYPE: &str = "campaign.dispatch_recorded";
/// Event type for `CampaignCompleted`.
pub const CAMPAIGN_COMPLETED_EVENT_TYPE: &str = "campaign.completed";
/// Event type for `CampaignFailed`.
pub const CAMPAIGN_FAILED_EVENT_TYPE: &str = "campaign.failed";

/// Emitted when a campaign is created in `draft`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCreated {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// The validated definition.
    pub definition: CampaignDefinition,
}

/// Emitted when a campaign is parked until its start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignScheduled {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// When the campaign becomes eligible to run.
    pub scheduled_at: DateTime<Utc>,
}

/// Emitted when a campaign enters `running` for the first time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStarted {
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Emitted when a running campaign is paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignPaused {
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Emitted when a paused campaign resumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignResumed {
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Emitted when an operator cancels a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCancelled {
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Emitted when a recipient reaches a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecorded {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// The persisted task outcome.
    pub record: DispatchRecord,
}

/// Emitted when every recipient has been processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCompleted {
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Emitted when the campaign gives up (channels exhausted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignFailed {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// Why the campaign failed.
    pub reason: String,
}

/// Event payload variants for the Campaign context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CampaignEventKind {
    /// A campaign has been created.
    CampaignCreated(CampaignCreated),
    /// A campaign is waiting for its start time.
    CampaignScheduled(CampaignScheduled),
    /// A campaign started running.
    CampaignStarted(CampaignStarted),
    /// A campaign was paused.
    CampaignPaused(CampaignPaused),
    /// A campaign was resumed.
    CampaignResumed(CampaignResumed),
    /// A campaign was cancelled.
    CampaignCancelled(CampaignCancelled),
    /// A recipient outcome was recorded.
    DispatchRecorded(DispatchRecorded),
    /// A campaign processed every recipient.
    CampaignCompleted(CampaignCompleted),
    /// A campaign failed.
    CampaignFailed(CampaignFailed),
}

/// Domain event envelope for the Campaign context.
#[derive(Debug, Clone)]
pub struct CampaignEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: CampaignEventKind,
}

impl CampaignEventKind {
    /// Returns the persisted type name for this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CampaignCreated(_) => CAMPAIGN_CREATED_EVENT_TYPE,
            Self::CampaignScheduled(_) => CAMPAIGN_SCHEDULED_EVENT_TYPE,
            Self::CampaignStarted(_) => CAMPAIGN_STARTED_EVENT_TYPE,
            Self::CampaignPaused(_) => CAMPAIGN_PAUSED_EVENT_TYPE,
            Self::CampaignResumed(_) => CAMPAIGN_RESUMED_EVENT_TYPE,
            Self::CampaignCancelled(_) => CAMPAIGN_CANCELLED_EVENT_TYPE,
            Self::DispatchRecorded(_) => DISPATCH_RECORDED_EVENT_TYPE,
            Self::CampaignCompleted(_) => CAMPAIGN_COMPLETED_EVENT_TYPE,
            Self::CampaignFailed(_) => CAMPAIGN_FAILED_EVENT_TYPE,
        }
    }
}

impl DomainEvent for CampaignEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("CampaignEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
