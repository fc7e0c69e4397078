//! Commands for the Campaign context.

use outreach_core::command::Command;
use uuid::Uuid;

use super::definition::CampaignDefinition;

/// Command to create a campaign from a validated definition.
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier assigned to the new campaign.
    pub campaign_id: Uuid,
    /// The campaign definition.
    pub definition: CampaignDefinition,
}

/// Command to start a draft campaign (immediately or at its scheduled time).
#[derive(Debug, Clone)]
pub struct StartCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Command issued by the scheduling trigger once a scheduled campaign is due.
#[derive(Debug, Clone)]
pub struct ActivateCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Command to pause a running campaign.
#[derive(Debug, Clone)]
pub struct PauseCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Command to resume a paused campaign.
#[derive(Debug, Clone)]
pub struct ResumeCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

/// Command to cancel a campaign.
#[derive(Debug, Clone)]
pub struct CancelCampaign {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The campaign identifier.
    pub campaign_id: Uuid,
}

macro_rules! impl_command {
    ($($command:ty => $name:literal),+ $(,)?) => {
        $(
            impl Command for $command {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn aggregate_id(&self) -> Uuid {
                    self.campaign_id
                }
            }
        )+
    };
}

impl_command! {
    CreateCampaign => "campaign.create",
    StartCampaign => "campaign.start",
    ActivateCampaign => "campaign.activate",
    PauseCampaign => "campaign.pause",
    ResumeCampaign => "campaign.resume",
    CancelCampaign => "campaign.cancel",
}
