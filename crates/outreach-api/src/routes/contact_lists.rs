//! Routes for uploading contact lists.

use axum::extract::{Path, State};
use axum::routing::put;
use axum::{Json, Router};
use outreach_campaign::domain::definition::Recipient;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// One contact in an uploaded list.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    /// Contact id; generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Name shown to operators.
    pub display_name: String,
    /// Phone or WhatsApp number.
    pub address: String,
}

/// Request body for PUT /contact-lists/{id}.
#[derive(Debug, Deserialize)]
pub struct PutContactListRequest {
    /// The list's contacts, in dispatch order.
    pub recipients: Vec<ContactRequest>,
}

/// Response body for PUT /contact-lists/{id}.
#[derive(Debug, Serialize)]
pub struct PutContactListResponse {
    /// The stored list.
    pub list_id: Uuid,
    /// Contacts kept after de-duplication.
    pub recipients: usize,
}

/// PUT /contact-lists/{list_id}
#[instrument(
    skip(state, request),
    fields(list_id = %list_id, submitted = request.recipients.len())
)]
async fn put_contact_list(
    State(state): State<AppState>,
    Path(list_id): Path<Uuid>,
    Json(request): Json<PutContactListRequest>,
) -> Result<Json<PutContactListResponse>, ApiError> {
    let recipients = request
        .recipients
        .into_iter()
        .map(|contact| Recipient {
            id: contact.id.unwrap_or_else(Uuid::new_v4),
            display_name: contact.display_name,
            address: contact.address,
        })
        .collect();

    let kept = state.contacts.put_list(list_id, recipients).await?;
    info!(kept, "contact list stored");

    Ok(Json(PutContactListResponse {
        list_id,
        recipients: kept,
    }))
}

/// Returns the router for contact lists.
pub fn router() -> Router<AppState> {
    Router::new().route("/{list_id}", put(put_contact_list))
}
