//! Command handlers for the Campaign context.
//!
//! Each handler loads the aggregate, runs the domain method, and appends the
//! resulting events with optimistic concurrency.

use outreach_core::aggregate::AggregateRoot;
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use outreach_core::event::{DomainEvent, EventMetadata};
use outreach_core::repository::{EventRepository, StoredEvent};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Campaign, CampaignStatus};
use crate::domain::commands::{
    ActivateCampaign, CancelCampaign, CreateCampaign, PauseCampaign, ResumeCampaign,
    StartCampaign,
};
use crate::domain::events::{CampaignEvent, CampaignEventKind};

/// Outcome of a successful campaign command.
#[derive(Debug, Clone)]
pub struct CampaignCommandResult {
    /// The campaign the command targeted.
    pub aggregate_id: Uuid,
    /// Lifecycle state after the command.
    pub status: CampaignStatus,
    /// Events appended by the command (empty for no-ops).
    pub stored_events: Vec<StoredEvent>,
}

/// Reconstitutes a `Campaign` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub fn reconstitute(
    campaign_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Campaign, DomainError> {
    let mut campaign = Campaign::new(campaign_id);
    for stored in existing_events {
        let kind: CampaignEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        let event = CampaignEvent {
            metadata: EventMetadata::from_stored(stored),
            kind,
        };
        campaign.apply(&event);
    }
    Ok(campaign)
}

/// Loads a campaign, failing if its stream is empty.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for unknown ids, or any error
/// from the repository or deserialization.
pub async fn load_campaign(
    campaign_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Campaign, DomainError> {
    let existing_events = repo.load_events(campaign_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(campaign_id));
    }
    reconstitute(campaign_id, &existing_events)
}

/// Appends the campaign's uncommitted events and folds them into its state.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if another writer appended to
/// the stream first; the campaign is left untouched in that case.
pub async fn save_campaign(
    campaign: &mut Campaign,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let stored_events: Vec<StoredEvent> = campaign
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored)
        .collect();
    if stored_events.is_empty() {
        return Ok(stored_events);
    }
    repo.append_events(campaign.id, campaign.version(), &stored_events)
        .await?;
    campaign.commit();
    Ok(stored_events)
}

fn result_of(campaign: &Campaign, stored_events: Vec<StoredEvent>) -> CampaignCommandResult {
    CampaignCommandResult {
        aggregate_id: campaign.id,
        status: campaign.status(),
        stored_events,
    }
}

/// Handles the `CreateCampaign` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` for invalid definitions, or a
/// repository error if appending fails.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_create_campaign(
    command: &CreateCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let existing_events = repo.load_events(command.campaign_id).await?;
    let mut campaign = reconstitute(command.campaign_id, &existing_events)?;

    campaign.create(command.definition.clone(), command.correlation_id, clock)?;

    let stored_events = save_campaign(&mut campaign, repo).await?;
    debug!(status = %campaign.status(), "campaign created");
    Ok(result_of(&campaign, stored_events))
}

/// Handles the `StartCampaign` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound`, `DomainError::InvalidTransition`
/// or a repository error.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_start_campaign(
    command: &StartCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let mut campaign = load_campaign(command.campaign_id, repo).await?;

    campaign.start(command.correlation_id, clock)?;

    let stored_events = save_campaign(&mut campaign, repo).await?;
    Ok(result_of(&campaign, stored_events))
}

/// Handles the `ActivateCampaign` command. Activating an already running
/// campaign succeeds without appending anything.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the campaign is not yet due,
/// `DomainError::InvalidTransition` from states other than scheduled or
/// running, or a repository error.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_activate_campaign(
    command: &ActivateCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let mut campaign = load_campaign(command.campaign_id, repo).await?;

    if !campaign.activate(command.correlation_id, clock)? {
        return Ok(result_of(&campaign, Vec::new()));
    }

    let stored_events = save_campaign(&mut campaign, repo).await?;
    Ok(result_of(&campaign, stored_events))
}

/// Handles the `PauseCampaign` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` unless running, or a repository
/// error.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_pause_campaign(
    command: &PauseCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let mut campaign = load_campaign(command.campaign_id, repo).await?;

    campaign.pause(command.correlation_id, clock)?;

    let stored_events = save_campaign(&mut campaign, repo).await?;
    Ok(result_of(&campaign, stored_events))
}

/// Handles the `ResumeCampaign` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` unless paused, or a repository
/// error.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_resume_campaign(
    command: &ResumeCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let mut campaign = load_campaign(command.campaign_id, repo).await?;

    campaign.resume(command.correlation_id, clock)?;

    let stored_events = save_campaign(&mut campaign, repo).await?;
    Ok(result_of(&campaign, stored_events))
}

/// Handles the `CancelCampaign` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` from draft or terminal states, or
/// a repository error.
#[instrument(skip_all, fields(campaign_id = %command.campaign_id))]
pub async fn handle_cancel_campaign(
    command: &CancelCampaign,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<CampaignCommandResult, DomainError> {
    let mut campaign = load_campaign(command.campaign_id, repo).await?;

    campaign.cancel(command.correlation_id, clock)?;

    let stored_events = save_campaign(&mut campaign, repo).await?;
    Ok(result_of(&campaign, stored_events))
}
