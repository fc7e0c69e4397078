//! Routes for the Campaign bounded context.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use outreach_campaign::application::command_handlers::CampaignCommandResult;
use outreach_campaign::application::query_handlers::{
    self, CampaignSummary, CampaignView, TaskPage,
};
use outreach_campaign::domain::aggregates::CampaignStatus;
use outreach_campaign::domain::commands::{
    CancelCampaign, CreateCampaign, PauseCampaign, ResumeCampaign, StartCampaign,
};
use outreach_campaign::domain::definition::{
    CampaignDefinition, ContentPayload, DistributionMode, Pacing, Recipient,
};
use outreach_campaign::domain::outcome::CampaignProgress;
use outreach_core::error::DomainError;
use outreach_dispatch::ContactRegistry;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

fn default_distribution_mode() -> DistributionMode {
    DistributionMode::Single
}

/// Request body for POST /campaigns.
///
/// Recipients come either inline or from a stored contact list, never both.
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Inline recipient snapshot.
    #[serde(default)]
    pub recipients: Option<Vec<Recipient>>,
    /// Contact list to snapshot recipients from.
    #[serde(default)]
    pub contact_list_id: Option<Uuid>,
    /// Content rotation.
    pub content_variants: Vec<ContentPayload>,
    /// Channels eligible for dispatch.
    pub channel_ids: Vec<Uuid>,
    /// Per-channel pacing bounds.
    pub pacing: Pacing,
    /// Channel selection strategy; defaults to `single`.
    #[serde(default = "default_distribution_mode")]
    pub distribution_mode: DistributionMode,
    /// Deferred start time.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Query string for GET /campaigns/{id}/tasks.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    /// Rows per page.
    pub page_size: Option<usize>,
}

/// Response body returned after a campaign command is handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The campaign the command targeted.
    pub aggregate_id: Uuid,
    /// Lifecycle state after the command.
    pub status: CampaignStatus,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

impl From<CampaignCommandResult> for CommandResponse {
    fn from(result: CampaignCommandResult) -> Self {
        Self {
            aggregate_id: result.aggregate_id,
            status: result.status,
            event_ids: result.stored_events.iter().map(|e| e.event_id).collect(),
        }
    }
}

async fn resolve_recipients(
    state: &AppState,
    request: &mut CreateCampaignRequest,
) -> Result<Vec<Recipient>, DomainError> {
    match (request.recipients.take(), request.contact_list_id) {
        (Some(_), Some(_)) => Err(DomainError::Validation(
            "provide either recipients or contact_list_id, not both".into(),
        )),
        (Some(recipients), None) => Ok(recipients),
        (None, Some(list_id)) => state.contacts.recipients(list_id).await,
        (None, None) => Err(DomainError::Validation(
            "campaign needs recipients or a contact_list_id".into(),
        )),
    }
}

/// POST /campaigns
#[instrument(skip(state, request), fields(name = %request.name))]
async fn create_campaign(
    State(state): State<AppState>,
    Json(mut request): Json<CreateCampaignRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let recipients = resolve_recipients(&state, &mut request).await?;
    let command = CreateCampaign {
        correlation_id: Uuid::new_v4(),
        campaign_id: request.campaign_id.unwrap_or_else(Uuid::new_v4),
        definition: CampaignDefinition {
            name: request.name,
            recipients,
            content_variants: request.content_variants,
            channel_ids: request.channel_ids,
            pacing: request.pacing,
            distribution_mode: request.distribution_mode,
            scheduled_at: request.scheduled_at,
        },
    };

    info!(
        correlation_id = %command.correlation_id,
        campaign_id = %command.campaign_id,
        "handling create_campaign command"
    );

    let result = state.engine.create_campaign(&command).await?;
    Ok(Json(CommandResponse::from(result)))
}

/// GET /campaigns
#[instrument(skip(state))]
async fn list_campaigns(
    State(state): State<AppState>,
) -> Result<Json<Vec<CampaignSummary>>, ApiError> {
    let summaries = query_handlers::list_campaigns(&*state.event_repository).await?;
    Ok(Json(summaries))
}

/// GET /campaigns/{campaign_id}
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn get_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignView>, ApiError> {
    let view = query_handlers::get_campaign_by_id(campaign_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// GET /campaigns/{campaign_id}/tasks
#[instrument(skip(state, query), fields(campaign_id = %campaign_id))]
async fn list_tasks(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TaskPage>, ApiError> {
    let page = query_handlers::list_campaign_tasks(
        campaign_id,
        query.page,
        query.page_size,
        &*state.event_repository,
    )
    .await?;
    Ok(Json(page))
}

/// GET /campaigns/{campaign_id}/progress
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn get_progress(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignProgress>, ApiError> {
    let progress = state.engine.progress(campaign_id).await?;
    Ok(Json(progress))
}

/// POST /campaigns/{campaign_id}/start
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn start_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = StartCampaign {
        correlation_id: Uuid::new_v4(),
        campaign_id,
    };
    info!(correlation_id = %command.correlation_id, "handling start_campaign command");
    let result = state.engine.start_campaign(&command).await?;
    Ok(Json(CommandResponse::from(result)))
}

/// POST /campaigns/{campaign_id}/pause
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn pause_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = PauseCampaign {
        correlation_id: Uuid::new_v4(),
        campaign_id,
    };
    info!(correlation_id = %command.correlation_id, "handling pause_campaign command");
    let result = state.engine.pause_campaign(&command).await?;
    Ok(Json(CommandResponse::from(result)))
}

/// POST /campaigns/{campaign_id}/resume
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn resume_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = ResumeCampaign {
        correlation_id: Uuid::new_v4(),
        campaign_id,
    };
    info!(correlation_id = %command.correlation_id, "handling resume_campaign command");
    let result = state.engine.resume_campaign(&command).await?;
    Ok(Json(CommandResponse::from(result)))
}

/// POST /campaigns/{campaign_id}/cancel
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn cancel_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = CancelCampaign {
        correlation_id: Uuid::new_v4(),
        campaign_id,
    };
    info!(correlation_id = %command.correlation_id, "handling cancel_campaign command");
    let result = state.engine.cancel_campaign(&command).await?;
    Ok(Json(CommandResponse::from(result)))
}

/// Returns the router for the campaign context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_campaign).get(list_campaigns))
        .route("/{campaign_id}", get(get_campaign))
        .route("/{campaign_id}/tasks", get(list_tasks))
        .route("/{campaign_id}/progress", get(get_progress))
        .route("/{campaign_id}/start", post(start_campaign))
        .route("/{campaign_id}/pause", post(pause_campaign))
        .route("/{campaign_id}/resume", post(resume_campaign))
        .route("/{campaign_id}/cancel", post(cancel_campaign))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::TimeZone;
    use outreach_core::clock::Clock;
    use outreach_core::repository::EventRepository;
    use outreach_dispatch::{DispatchConfig, DispatchEngine, InMemoryContactRegistry};
    use outreach_test_support::{
        EmptyEventRepository, FailingEventRepository, FixedClock, MockRng, ScriptedChannelDriver,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state_with(event_repository: Arc<dyn EventRepository>) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let engine = Arc::new(DispatchEngine::new(
            event_repository.clone(),
            clock.clone(),
            Box::new(MockRng),
            Arc::new(ScriptedChannelDriver::new()),
            DispatchConfig::default(),
        ));
        AppState::new(
            clock,
            event_repository,
            engine,
            Arc::new(InMemoryContactRegistry::new()),
        )
    }

    fn create_body() -> Value {
        serde_json::json!({
            "name": "Flu shot reminder",
            "recipients": [
                { "id": Uuid::new_v4(), "display_name": "Ana", "address": "+15550100001" }
            ],
            "content_variants": [ { "type": "text", "body": "Time for your flu shot" } ],
            "channel_ids": [ Uuid::new_v4() ],
            "pacing": { "min_interval_ms": 1000, "max_interval_ms": 3000 }
        })
    }

    async fn post(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_create_campaign_returns_draft_with_event_ids() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(EmptyEventRepository)));

        // Act
        let (status, json) = post(app, "/", &create_body()).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "draft");
        assert_eq!(json["event_ids"].as_array().unwrap().len(), 1);
        Uuid::parse_str(json["aggregate_id"].as_str().unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_create_campaign_rejects_inverted_pacing() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(EmptyEventRepository)));
        let mut body = create_body();
        body["pacing"] = serde_json::json!({ "min_interval_ms": 5000, "max_interval_ms": 1000 });

        // Act
        let (status, json) = post(app, "/", &body).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_create_campaign_requires_exactly_one_recipient_source() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(EmptyEventRepository)));
        let mut body = create_body();
        body["contact_list_id"] = serde_json::json!(Uuid::new_v4());

        // Act
        let (status, json) = post(app, "/", &body).await;

        // Assert
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("not both"));
    }

    #[tokio::test]
    async fn test_create_campaign_from_unknown_contact_list_returns_404() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(EmptyEventRepository)));
        let mut body = create_body();
        body.as_object_mut().unwrap().remove("recipients");
        body["contact_list_id"] = serde_json::json!(Uuid::new_v4());

        // Act
        let (status, json) = post(app, "/", &body).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "aggregate_not_found");
    }

    #[tokio::test]
    async fn test_start_unknown_campaign_returns_404() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(EmptyEventRepository)));

        // Act
        let (status, _) = post(app, &format!("/{}/start", Uuid::new_v4()), &Value::Null).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pause_returns_500_when_repository_fails() {
        // Arrange
        let app = router().with_state(app_state_with(Arc::new(FailingEventRepository)));

        // Act
        let (status, json) = post(app, &format!("/{}/pause", Uuid::new_v4()), &Value::Null).await;

        // Assert
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "infrastructure_error");
    }
}
