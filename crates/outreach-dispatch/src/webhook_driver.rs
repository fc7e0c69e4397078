//! `ChannelDriver` that forwards every dispatch to an HTTP gateway.
//!
//! The gateway fronts the real providers (WhatsApp session API, telephony
//! voice assistant) and answers each POST with the dispatch outcome.

use std::time::Duration;

use async_trait::async_trait;
use outreach_campaign::domain::definition::ContentPayload;
use outreach_campaign::domain::outcome::DispatchOutcome;
use reqwest::StatusCode;
use outreach_channel::domain::aggregates::ChannelKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::driver::{ChannelDriver, ChannelTarget, DeliveryReport, DriverError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    channel_id: Uuid,
    channel_kind: ChannelKind,
    address: &'a str,
    payload: &'a ContentPayload,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    outcome: DispatchOutcome,
    #[serde(default)]
    detail: Option<String>,
}

/// Sends dispatches as JSON to `{base_url}/channels/{channel_id}/dispatch`.
#[derive(Debug, Clone)]
pub struct WebhookChannelDriver {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookChannelDriver {
    /// Creates a driver for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn endpoint(&self, channel: &ChannelTarget) -> String {
        format!("{}/channels/{}/dispatch", self.base_url, channel.channel_id)
    }
}

/// Maps a non-success gateway status to a driver error.
fn classify_status(status: StatusCode, body: &str) -> DriverError {
    let reason = if body.is_empty() {
        format!("gateway returned {status}")
    } else {
        format!("gateway returned {status}: {body}")
    };
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            DriverError::Retryable(reason)
        }
        StatusCode::UNPROCESSABLE_ENTITY => DriverError::InvalidRecipient(reason),
        s if s.is_server_error() => DriverError::Retryable(reason),
        _ => DriverError::Fatal(reason),
    }
}

#[async_trait]
impl ChannelDriver for WebhookChannelDriver {
    async fn send(
        &self,
        channel: &ChannelTarget,
        address: &str,
        payload: &ContentPayload,
    ) -> Result<DeliveryReport, DriverError> {
        let url = self.endpoint(channel);
        let response = self
            .client
            .post(&url)
            .json(&DispatchRequest {
                channel_id: channel.channel_id,
                channel_kind: channel.kind,
                address,
                payload,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(%url, error = %e, "gateway request failed");
                DriverError::Retryable(format!("gateway request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: DispatchResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Fatal(format!("unreadable gateway response: {e}")))?;
        debug!(
            channel_id = %channel.channel_id,
            outcome = ?body.outcome,
            "gateway accepted dispatch"
        );
        Ok(DeliveryReport {
            outcome: body.outcome,
            detail: body.detail,
        })
    }
}
