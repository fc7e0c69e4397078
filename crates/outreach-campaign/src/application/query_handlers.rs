//! Query handlers for the Campaign context.
//!
//! Campaigns are reconstituted from their event streams and returned as
//! read-only view DTOs.

use chrono::{DateTime, Utc};
use outreach_core::error::DomainError;
use outreach_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::load_campaign;
use crate::domain::aggregates::{Campaign, CampaignStatus};
use crate::domain::definition::CampaignDefinition;
use crate::domain::events::CAMPAIGN_CREATED_EVENT_TYPE;
use crate::domain::outcome::{CampaignProgress, DispatchOutcome};

/// Default number of tasks per page.
pub const DEFAULT_TASK_PAGE_SIZE: usize = 50;
/// Largest accepted page size.
pub const MAX_TASK_PAGE_SIZE: usize = 500;

/// Read-only view of a campaign.
#[derive(Debug, Serialize)]
pub struct CampaignView {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// The immutable definition.
    pub definition: CampaignDefinition,
    /// Lifecycle state.
    pub status: CampaignStatus,
    /// First transition into `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition into a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the campaign failed.
    pub failure_reason: Option<String>,
    /// Progress derived from persisted outcomes.
    pub progress: CampaignProgress,
    /// Current version (event count).
    pub version: i64,
}

/// One row of the campaign list.
#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    /// The campaign identifier.
    pub campaign_id: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub status: CampaignStatus,
    /// Progress derived from persisted outcomes.
    pub progress: CampaignProgress,
}

/// State of one recipient's dispatch task.
#[derive(Debug, Serialize)]
pub struct TaskView {
    /// Position in the recipient list.
    pub recipient_index: usize,
    /// Recipient identifier.
    pub recipient_id: Uuid,
    /// Recipient address.
    pub address: String,
    /// Channel of the final attempt.
    pub channel_id: Option<Uuid>,
    /// Outcome; `pending` until recorded.
    pub outcome: DispatchOutcome,
    /// Driver invocations made.
    pub attempts: u32,
    /// Optional detail.
    pub reason: Option<String>,
    /// When the outcome was recorded.
    pub recorded_at: Option<DateTime<Utc>>,
}

/// A page of dispatch tasks.
#[derive(Debug, Serialize)]
pub struct TaskPage {
    /// 1-based page number.
    pub page: usize,
    /// Page size used.
    pub page_size: usize,
    /// Total number of tasks (recipients).
    pub total: usize,
    /// Tasks on this page, ordered by recipient index.
    pub tasks: Vec<TaskView>,
}

fn to_view(campaign: Campaign) -> Result<CampaignView, DomainError> {
    let definition = campaign
        .definition()
        .cloned()
        .ok_or(DomainError::AggregateNotFound(campaign.id))?;
    Ok(CampaignView {
        campaign_id: campaign.id,
        definition,
        status: campaign.status(),
        started_at: campaign.started_at(),
        finished_at: campaign.finished_at(),
        failure_reason: campaign.failure_reason().map(str::to_owned),
        progress: campaign.progress(),
        version: campaign.version,
    })
}

/// Retrieves a campaign by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_campaign_by_id(
    campaign_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<CampaignView, DomainError> {
    let campaign = load_campaign(campaign_id, repo).await?;
    to_view(campaign)
}

/// Lists every campaign in creation order.
///
/// # Errors
///
/// Returns any repository or deserialization error.
pub async fn list_campaigns(
    repo: &dyn EventRepository,
) -> Result<Vec<CampaignSummary>, DomainError> {
    let ids = repo
        .aggregate_ids_by_event_type(CAMPAIGN_CREATED_EVENT_TYPE)
        .await?;
    let mut summaries = Vec::with_capacity(ids.len());
    for campaign_id in ids {
        let campaign = load_campaign(campaign_id, repo).await?;
        let Some(definition) = campaign.definition() else {
            continue;
        };
        summaries.push(CampaignSummary {
            campaign_id,
            name: definition.name.clone(),
            status: campaign.status(),
            progress: campaign.progress(),
        });
    }
    Ok(summaries)
}

/// Returns one page of a campaign's dispatch tasks.
///
/// `page` is 1-based; `page_size` defaults to [`DEFAULT_TASK_PAGE_SIZE`] and
/// must not exceed [`MAX_TASK_PAGE_SIZE`].
///
/// # Errors
///
/// Returns `DomainError::Validation` for a zero page or an out-of-range page
/// size, `DomainError::AggregateNotFound` for unknown campaigns.
pub async fn list_campaign_tasks(
    campaign_id: Uuid,
    page: Option<usize>,
    page_size: Option<usize>,
    repo: &dyn EventRepository,
) -> Result<TaskPage, DomainError> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(DEFAULT_TASK_PAGE_SIZE);
    if page == 0 {
        return Err(DomainError::Validation("page starts at 1".into()));
    }
    if page_size == 0 || page_size > MAX_TASK_PAGE_SIZE {
        return Err(DomainError::Validation(format!(
            "page_size must be between 1 and {MAX_TASK_PAGE_SIZE}"
        )));
    }

    let campaign = load_campaign(campaign_id, repo).await?;
    let definition = campaign
        .definition()
        .ok_or(DomainError::AggregateNotFound(campaign_id))?;
    let records = campaign.records();

    let tasks = definition
        .recipients
        .iter()
        .enumerate()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .map(|(index, recipient)| match records.get(&index) {
            Some(record) => TaskView {
                recipient_index: index,
                recipient_id: recipient.id,
                address: recipient.address.clone(),
                channel_id: record.channel_id,
                outcome: record.outcome,
                attempts: record.attempts,
                reason: record.reason.clone(),
                recorded_at: Some(record.recorded_at),
            },
            None => TaskView {
                recipient_index: index,
                recipient_id: recipient.id,
                address: recipient.address.clone(),
                channel_id: None,
                outcome: DispatchOutcome::Pending,
                attempts: 0,
                reason: None,
                recorded_at: None,
            },
        })
        .collect();

    Ok(TaskPage {
        page,
        page_size,
        total: definition.total_contacts(),
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use outreach_core::aggregate::AggregateRoot;
    use outreach_core::error::DomainError;
    use outreach_core::event::DomainEvent;
    use outreach_core::repository::StoredEvent;
    use uuid::Uuid;

    use super::*;
    use crate::domain::definition::{ContentPayload, DistributionMode, Pacing, Recipient};
    use crate::domain::outcome::TaskResolution;
    use outreach_test_support::{EmptyEventRepository, FixedClock, RecordingEventRepository};

    fn campaign_events(campaign_id: Uuid, recipients: usize) -> Vec<StoredEvent> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let definition = CampaignDefinition {
            name: "Open house".into(),
            recipients: (0..recipients)
                .map(|i| Recipient {
                    id: Uuid::new_v4(),
                    display_name: format!("Lead {i}"),
                    address: format!("+551130000{i:03}"),
                })
                .collect(),
            content_variants: vec![ContentPayload::Text {
                body: "Visit us on Saturday".into(),
            }],
            channel_ids: vec![Uuid::new_v4()],
            pacing: Pacing::fixed(0),
            distribution_mode: DistributionMode::Single,
            scheduled_at: None,
        };
        let mut campaign = Campaign::new(campaign_id);
        let mut events = Vec::new();
        let mut flush = |campaign: &mut Campaign| {
            events.extend(campaign.uncommitted_events().iter().map(DomainEvent::to_stored));
            campaign.commit();
        };
        campaign.create(definition, Uuid::new_v4(), &clock).unwrap();
        flush(&mut campaign);
        campaign.start(Uuid::new_v4(), &clock).unwrap();
        flush(&mut campaign);
        campaign
            .record_dispatch(
                TaskResolution {
                    recipient_index: 1,
                    channel_id: None,
                    outcome: DispatchOutcome::Delivered,
                    attempts: 2,
                    reason: Some("accepted".into()),
                },
                Uuid::new_v4(),
                &clock,
            )
            .unwrap();
        flush(&mut campaign);
        events
    }

    #[tokio::test]
    async fn test_get_campaign_by_id_returns_view_with_progress() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new(Ok(campaign_events(campaign_id, 4)));

        // Act
        let view = get_campaign_by_id(campaign_id, &repo).await.unwrap();

        // Assert
        assert_eq!(view.campaign_id, campaign_id);
        assert_eq!(view.status, CampaignStatus::Running);
        assert_eq!(view.version, 3);
        assert_eq!(view.progress.sent, 1);
        assert_eq!(view.progress.percent_complete, 25);
        assert_eq!(view.definition.name, "Open house");
    }

    #[tokio::test]
    async fn test_get_campaign_by_id_returns_not_found_when_no_events() {
        // Arrange
        let campaign_id = Uuid::new_v4();

        // Act
        let result = get_campaign_by_id(campaign_id, &EmptyEventRepository).await;

        // Assert
        match result.unwrap_err() {
            DomainError::AggregateNotFound(id) => assert_eq!(id, campaign_id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_campaign_tasks_marks_unrecorded_as_pending() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new(Ok(campaign_events(campaign_id, 5)));

        // Act
        let page = list_campaign_tasks(campaign_id, Some(1), Some(2), &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(page.total, 5);
        assert_eq!(page.tasks.len(), 2);
        assert_eq!(page.tasks[0].outcome, DispatchOutcome::Pending);
        assert_eq!(page.tasks[0].attempts, 0);
        assert_eq!(page.tasks[1].outcome, DispatchOutcome::Delivered);
        assert_eq!(page.tasks[1].attempts, 2);
        assert_eq!(page.tasks[1].reason.as_deref(), Some("accepted"));
    }

    #[tokio::test]
    async fn test_list_campaign_tasks_last_page_is_partial() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new(Ok(campaign_events(campaign_id, 5)));

        // Act
        let page = list_campaign_tasks(campaign_id, Some(3), Some(2), &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(page.tasks.len(), 1);
        assert_eq!(page.tasks[0].recipient_index, 4);
    }

    #[tokio::test]
    async fn test_list_campaign_tasks_rejects_oversized_page() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new(Ok(campaign_events(campaign_id, 2)));

        // Act
        let result =
            list_campaign_tasks(campaign_id, None, Some(MAX_TASK_PAGE_SIZE + 1), &repo).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_campaigns_summarises_each_created_campaign() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let repo = RecordingEventRepository::new(Ok(campaign_events(campaign_id, 2)))
            .with_aggregate_ids(vec![campaign_id]);

        // Act
        let summaries = list_campaigns(&repo).await.unwrap();

        // Assert
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].campaign_id, campaign_id);
        assert_eq!(summaries[0].name, "Open house");
        assert_eq!(summaries[0].progress.completed_calls, 1);
    }
}
