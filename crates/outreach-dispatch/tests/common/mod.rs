//! Shared harness for dispatch engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use outreach_campaign::application::query_handlers::{CampaignView, get_campaign_by_id};
use outreach_campaign::domain::commands::{
    CancelCampaign, CreateCampaign, PauseCampaign, ResumeCampaign, StartCampaign,
};
use outreach_campaign::domain::definition::{
    CampaignDefinition, ContentPayload, DistributionMode, Pacing, Recipient,
};
use outreach_channel::domain::aggregates::{ChannelKind, ConnectionState};
use outreach_channel::domain::commands::RegisterChannel;
use outreach_core::rng::{DeterministicRng, SystemRng};
use outreach_dispatch::{DispatchConfig, DispatchEngine, WorkerExit};
use outreach_event_store::memory_event_repository::InMemoryEventRepository;
use outreach_test_support::{ManualClock, ScriptedChannelDriver};
use uuid::Uuid;

/// Wall-clock start of every test.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Small back-offs and a short exhaustion budget so failure paths finish
/// quickly on virtual time.
pub fn fast_config() -> DispatchConfig {
    DispatchConfig {
        max_attempts: 3,
        busy_backoff: Duration::from_millis(10),
        busy_backoff_max: Duration::from_millis(100),
        exhausted_backoff: Duration::from_millis(100),
        exhausted_retries: 3,
        scheduler_poll: Duration::from_millis(100),
    }
}

/// `count` recipients with distinct dialable addresses.
pub fn recipients(count: usize) -> Vec<Recipient> {
    (0..count)
        .map(|i| Recipient {
            id: Uuid::new_v4(),
            display_name: format!("Contact {i}"),
            address: address(i),
        })
        .collect()
}

/// Address of the `i`-th recipient built by [`recipients`].
pub fn address(i: usize) -> String {
    format!("+1555010{i:04}")
}

pub fn definition(
    recipients: Vec<Recipient>,
    channel_ids: Vec<Uuid>,
    pacing: Pacing,
    distribution_mode: DistributionMode,
) -> CampaignDefinition {
    CampaignDefinition {
        name: "Spring outreach".into(),
        recipients,
        content_variants: vec![ContentPayload::Text {
            body: "Hello from the clinic".into(),
        }],
        channel_ids,
        pacing,
        distribution_mode,
        scheduled_at: None,
    }
}

pub struct Harness {
    pub engine: Arc<DispatchEngine>,
    pub repo: Arc<InMemoryEventRepository>,
    pub driver: Arc<ScriptedChannelDriver>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(driver: ScriptedChannelDriver) -> Self {
        Self::with_rng(driver, Box::new(SystemRng::seeded(7)))
    }

    pub fn with_rng(driver: ScriptedChannelDriver, rng: Box<dyn DeterministicRng>) -> Self {
        Self::sharing(
            Arc::new(InMemoryEventRepository::new()),
            Arc::new(ManualClock::new(start_time())),
            driver,
            rng,
        )
    }

    /// A harness over an existing store, as a restarted process would see it.
    pub fn sharing(
        repo: Arc<InMemoryEventRepository>,
        clock: Arc<ManualClock>,
        driver: ScriptedChannelDriver,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        let driver = Arc::new(driver);
        let engine = Arc::new(DispatchEngine::new(
            repo.clone(),
            clock.clone(),
            rng,
            driver.clone(),
            fast_config(),
        ));
        Self {
            engine,
            repo,
            driver,
            clock,
        }
    }

    pub async fn channel(&self, state: ConnectionState) -> Uuid {
        let channel_id = Uuid::new_v4();
        self.engine
            .register_channel(&RegisterChannel {
                correlation_id: Uuid::new_v4(),
                channel_id,
                name: format!("line-{channel_id}"),
                kind: ChannelKind::Messaging,
                connection_state: state,
            })
            .await
            .unwrap();
        channel_id
    }

    pub async fn channels(&self, count: usize) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.channel(ConnectionState::Connected).await);
        }
        ids
    }

    pub async fn create(&self, definition: CampaignDefinition) -> Uuid {
        let campaign_id = Uuid::new_v4();
        self.engine
            .create_campaign(&CreateCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
                definition,
            })
            .await
            .unwrap();
        campaign_id
    }

    pub async fn start(&self, campaign_id: Uuid) {
        self.engine
            .start_campaign(&StartCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
            })
            .await
            .unwrap();
    }

    pub async fn launch(&self, definition: CampaignDefinition) -> Uuid {
        let campaign_id = self.create(definition).await;
        self.start(campaign_id).await;
        campaign_id
    }

    pub async fn pause(&self, campaign_id: Uuid) {
        self.engine
            .pause_campaign(&PauseCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
            })
            .await
            .unwrap();
    }

    pub async fn resume(&self, campaign_id: Uuid) {
        self.engine
            .resume_campaign(&ResumeCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
            })
            .await
            .unwrap();
    }

    pub async fn cancel(&self, campaign_id: Uuid) {
        self.engine
            .cancel_campaign(&CancelCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
            })
            .await
            .unwrap();
    }

    /// Waits (on virtual time) for the campaign's worker to exit.
    pub async fn finish(&self, campaign_id: Uuid) -> WorkerExit {
        tokio::time::timeout(Duration::from_secs(3_600), self.engine.join(campaign_id))
            .await
            .expect("worker did not exit within an hour of virtual time")
            .expect("no worker was started")
    }

    /// Like [`finish`](Self::finish), for campaigns started by the scheduling
    /// trigger rather than by the test.
    pub async fn finish_after_activation(&self, campaign_id: Uuid) -> WorkerExit {
        let exit = async {
            loop {
                if let Some(exit) = self.engine.join(campaign_id).await {
                    return exit;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(3_600), exit)
            .await
            .expect("campaign was not activated within an hour of virtual time")
    }

    pub async fn view(&self, campaign_id: Uuid) -> CampaignView {
        get_campaign_by_id(campaign_id, self.repo.as_ref())
            .await
            .unwrap()
    }
}
