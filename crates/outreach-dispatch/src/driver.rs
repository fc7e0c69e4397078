//! The seam between the engine and whatever actually places a call or sends
//! a message.

use async_trait::async_trait;
use outreach_campaign::domain::definition::ContentPayload;
use outreach_campaign::domain::outcome::DispatchOutcome;
use outreach_channel::domain::aggregates::ChannelKind;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// The channel a dispatch goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelTarget {
    /// Channel identifier.
    pub channel_id: Uuid,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
}

/// What the driver observed for one completed dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// `delivered`, `answered`, `not_answered` or `failed`.
    pub outcome: DispatchOutcome,
    /// Provider detail, e.g. a call end reason.
    pub detail: Option<String>,
}

impl DeliveryReport {
    /// A report with no detail.
    #[must_use]
    pub fn new(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            detail: None,
        }
    }

    /// Attaches provider detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A dispatch that did not produce a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Transient; the same recipient is tried again.
    #[error("retryable send error: {0}")]
    Retryable(String),
    /// Permanent; the recipient is recorded as failed.
    #[error("fatal send error: {0}")]
    Fatal(String),
    /// The provider rejected the address; the recipient is skipped.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Places one call or sends one message.
#[async_trait]
pub trait ChannelDriver: Send + Sync {
    /// Dispatches `payload` to `address` over `channel`.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] classifying why no report was produced.
    async fn send(
        &self,
        channel: &ChannelTarget,
        address: &str,
        payload: &ContentPayload,
    ) -> Result<DeliveryReport, DriverError>;
}
