//! Campaign definition value types.
//!
//! A `CampaignDefinition` is validated once, when the campaign is created,
//! and is immutable afterwards. Dispatch code relies on the invariants
//! checked here instead of re-validating per recipient.

use chrono::{DateTime, Utc};
use outreach_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One validated recipient, as supplied by the contact registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Contact identifier in the upstream registry.
    pub id: Uuid,
    /// Name shown to operators.
    pub display_name: String,
    /// Phone number or WhatsApp-formatted number.
    pub address: String,
}

impl Recipient {
    /// Returns `true` when the address carries at least one digit.
    ///
    /// Anything else cannot be dialled or messaged and is recorded as
    /// skipped without reaching the channel driver.
    #[must_use]
    pub fn has_dialable_address(&self) -> bool {
        self.address.chars().any(|c| c.is_ascii_digit())
    }
}

/// Kind of media attached to a broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Still image.
    Image,
    /// Voice note or audio file.
    Audio,
    /// Video clip.
    Video,
}

/// One unit of content delivered to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPayload {
    /// Plain text message.
    Text {
        /// Message body.
        body: String,
    },
    /// Media message with an optional caption.
    Media {
        /// Kind of media.
        media_type: MediaType,
        /// Location of the media file.
        url: String,
        /// Optional caption sent with the media.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Automated voice call driven by an assistant configuration.
    VoiceCall {
        /// Voice assistant identifier at the telephony provider.
        assistant_id: String,
        /// Optional opening line spoken by the assistant.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        first_message: Option<String>,
    },
}

impl ContentPayload {
    /// Returns `true` for call-style payloads.
    #[must_use]
    pub fn is_voice(&self) -> bool {
        matches!(self, Self::VoiceCall { .. })
    }

    fn validate(&self, position: usize) -> Result<(), DomainError> {
        let empty_field = match self {
            Self::Text { body } if body.trim().is_empty() => Some("body"),
            Self::Media { url, .. } if url.trim().is_empty() => Some("url"),
            Self::VoiceCall { assistant_id, .. } if assistant_id.trim().is_empty() => {
                Some("assistant_id")
            }
            _ => None,
        };
        match empty_field {
            Some(field) => Err(DomainError::Validation(format!(
                "content variant {position}: {field} must not be empty"
            ))),
            None => Ok(()),
        }
    }
}

/// Bounds for the randomized delay between two dispatches on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Lower bound in milliseconds (inclusive).
    pub min_interval_ms: u32,
    /// Upper bound in milliseconds (inclusive).
    pub max_interval_ms: u32,
}

impl Pacing {
    /// Creates a pacing range.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `min_interval_ms > max_interval_ms`.
    pub fn new(min_interval_ms: u32, max_interval_ms: u32) -> Result<Self, DomainError> {
        let pacing = Self {
            min_interval_ms,
            max_interval_ms,
        };
        pacing.validate()?;
        Ok(pacing)
    }

    /// A pacing with the same lower and upper bound.
    #[must_use]
    pub fn fixed(interval_ms: u32) -> Self {
        Self {
            min_interval_ms: interval_ms,
            max_interval_ms: interval_ms,
        }
    }

    fn validate(self) -> Result<(), DomainError> {
        if self.min_interval_ms > self.max_interval_ms {
            return Err(DomainError::Validation(format!(
                "pacing min_interval_ms ({}) exceeds max_interval_ms ({})",
                self.min_interval_ms, self.max_interval_ms
            )));
        }
        Ok(())
    }
}

/// How a campaign picks the channel for each dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMode {
    /// Every dispatch uses the first configured channel.
    Single,
    /// Each dispatch draws uniformly among idle, connected channels.
    RandomAcrossChannels,
}

/// The validated, immutable description of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignDefinition {
    /// Display name.
    pub name: String,
    /// Ordered recipient snapshot.
    pub recipients: Vec<Recipient>,
    /// Content rotation; recipient `i` receives `content_variants[i % len]`.
    pub content_variants: Vec<ContentPayload>,
    /// Channels eligible for this campaign.
    pub channel_ids: Vec<Uuid>,
    /// Per-channel pacing.
    pub pacing: Pacing,
    /// Channel selection strategy.
    pub distribution_mode: DistributionMode,
    /// Deferred start time; `None` starts on activation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl CampaignDefinition {
    /// Checks every creation-time invariant.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "campaign name must not be empty".into(),
            ));
        }
        if self.recipients.is_empty() {
            return Err(DomainError::Validation(
                "campaign needs at least one recipient".into(),
            ));
        }
        if self.content_variants.is_empty() {
            return Err(DomainError::Validation(
                "campaign needs at least one content variant".into(),
            ));
        }
        for (position, variant) in self.content_variants.iter().enumerate() {
            variant.validate(position)?;
        }
        if self.content_variants.len() > 1
            && self.content_variants.iter().any(ContentPayload::is_voice)
        {
            return Err(DomainError::Validation(
                "voice call campaigns use exactly one content variant".into(),
            ));
        }
        if self.channel_ids.is_empty() {
            return Err(DomainError::Validation(
                "campaign needs at least one channel".into(),
            ));
        }
        for (position, channel_id) in self.channel_ids.iter().enumerate() {
            if self.channel_ids[..position].contains(channel_id) {
                return Err(DomainError::Validation(format!(
                    "channel {channel_id} is listed more than once"
                )));
            }
        }
        self.pacing.validate()
    }

    /// Returns the payload for the recipient at `recipient_index`.
    #[must_use]
    pub fn payload_for(&self, recipient_index: usize) -> &ContentPayload {
        &self.content_variants[recipient_index % self.content_variants.len()]
    }

    /// Returns the number of recipients.
    #[must_use]
    pub fn total_contacts(&self) -> usize {
        self.recipients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(address: &str) -> Recipient {
        Recipient {
            id: Uuid::new_v4(),
            display_name: "Ana".into(),
            address: address.into(),
        }
    }

    fn text(body: &str) -> ContentPayload {
        ContentPayload::Text { body: body.into() }
    }

    fn valid_definition() -> CampaignDefinition {
        CampaignDefinition {
            name: "Spring launch".into(),
            recipients: vec![recipient("+5511999990001"), recipient("+5511999990002")],
            content_variants: vec![text("hello"), text("hi there")],
            channel_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            pacing: Pacing::fixed(1_000),
            distribution_mode: DistributionMode::RandomAcrossChannels,
            scheduled_at: None,
        }
    }

    fn validation_message(definition: &CampaignDefinition) -> String {
        match definition.validate().unwrap_err() {
            DomainError::Validation(msg) => msg,
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_definition_passes() {
        assert!(valid_definition().validate().is_ok());
    }

    #[test]
    fn test_pacing_new_rejects_inverted_bounds() {
        assert!(Pacing::new(2_000, 1_000).is_err());
        assert_eq!(Pacing::new(0, 0).unwrap(), Pacing::fixed(0));
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let mut definition = valid_definition();
        definition.recipients.clear();

        assert!(validation_message(&definition).contains("recipient"));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut definition = valid_definition();
        let channel = definition.channel_ids[0];
        definition.channel_ids.push(channel);

        assert!(validation_message(&definition).contains(&channel.to_string()));
    }

    #[test]
    fn test_voice_call_with_rotation_rejected() {
        let mut definition = valid_definition();
        definition.content_variants = vec![
            ContentPayload::VoiceCall {
                assistant_id: "asst-1".into(),
                first_message: None,
            },
            text("fallback"),
        ];

        assert!(validation_message(&definition).contains("voice"));
    }

    #[test]
    fn test_blank_text_body_rejected() {
        let mut definition = valid_definition();
        definition.content_variants = vec![text("   ")];

        assert!(validation_message(&definition).contains("body"));
    }

    #[test]
    fn test_payload_for_rotates_by_recipient_index() {
        let definition = valid_definition();

        assert_eq!(definition.payload_for(0), &text("hello"));
        assert_eq!(definition.payload_for(1), &text("hi there"));
        assert_eq!(definition.payload_for(2), &text("hello"));
    }

    #[test]
    fn test_has_dialable_address_requires_a_digit() {
        assert!(recipient("+55 11 99999-0001").has_dialable_address());
        assert!(!recipient("not-a-number").has_dialable_address());
    }

    #[test]
    fn test_content_payload_uses_type_tag() {
        let json = serde_json::to_value(ContentPayload::Media {
            media_type: MediaType::Image,
            url: "https://cdn.example/promo.png".into(),
            caption: None,
        })
        .unwrap();

        assert_eq!(json["type"], "media");
        assert_eq!(json["media_type"], "image");
        assert!(json.get("caption").is_none());
    }
}
