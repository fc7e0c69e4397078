//! Routes for the Channel bounded context.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use outreach_channel::application::query_handlers::{self, ChannelView};
use outreach_channel::domain::aggregates::{ChannelKind, ConnectionState};
use outreach_channel::domain::commands::{ChangeConnectionState, RegisterChannel};
use outreach_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

fn default_connection_state() -> ConnectionState {
    ConnectionState::Connected
}

/// Request body for POST /channels.
#[derive(Debug, Deserialize)]
pub struct RegisterChannelRequest {
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub channel_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
    /// Initial connection state; defaults to `connected`.
    #[serde(default = "default_connection_state")]
    pub connection_state: ConnectionState,
}

/// Request body for POST /channels/{id}/connection-state.
#[derive(Debug, Deserialize)]
pub struct ConnectionStateRequest {
    /// The new state.
    pub connection_state: ConnectionState,
}

/// Response body returned after a channel command is handled.
#[derive(Debug, Serialize)]
pub struct ChannelCommandResponse {
    /// The channel the command targeted.
    pub aggregate_id: Uuid,
    /// Connection state after the command.
    pub connection_state: ConnectionState,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

fn respond(view: &ChannelView, events: &[StoredEvent]) -> Json<ChannelCommandResponse> {
    Json(ChannelCommandResponse {
        aggregate_id: view.channel_id,
        connection_state: view.connection_state,
        event_ids: events.iter().map(|e| e.event_id).collect(),
    })
}

/// POST /channels
#[instrument(skip(state, request), fields(name = %request.name))]
async fn register_channel(
    State(state): State<AppState>,
    Json(request): Json<RegisterChannelRequest>,
) -> Result<Json<ChannelCommandResponse>, ApiError> {
    let command = RegisterChannel {
        correlation_id: Uuid::new_v4(),
        channel_id: request.channel_id.unwrap_or_else(Uuid::new_v4),
        name: request.name,
        kind: request.kind,
        connection_state: request.connection_state,
    };

    info!(correlation_id = %command.correlation_id, "handling register_channel command");

    let (view, events) = state.engine.register_channel(&command).await?;
    Ok(respond(&view, &events))
}

/// GET /channels
#[instrument(skip(state))]
async fn list_channels(State(state): State<AppState>) -> Result<Json<Vec<ChannelView>>, ApiError> {
    let views = query_handlers::list_channels(&*state.event_repository).await?;
    Ok(Json(views))
}

/// GET /channels/{channel_id}
#[instrument(skip(state), fields(channel_id = %channel_id))]
async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<Json<ChannelView>, ApiError> {
    let view = query_handlers::get_channel_by_id(channel_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// POST /channels/{channel_id}/connection-state
#[instrument(skip(state, request), fields(channel_id = %channel_id))]
async fn change_connection_state(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Json(request): Json<ConnectionStateRequest>,
) -> Result<Json<ChannelCommandResponse>, ApiError> {
    let command = ChangeConnectionState {
        correlation_id: Uuid::new_v4(),
        channel_id,
        connection_state: request.connection_state,
    };

    info!(correlation_id = %command.correlation_id, "handling change_connection_state command");

    let (view, events) = state.engine.change_channel_state(&command).await?;
    Ok(respond(&view, &events))
}

/// Returns the router for the channel context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_channel).get(list_channels))
        .route("/{channel_id}", get(get_channel))
        .route("/{channel_id}/connection-state", post(change_connection_state))
}
