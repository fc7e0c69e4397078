//! `DispatchEngine`: the façade the control surface talks to.
//!
//! Every control operation persists through the campaign or channel command
//! handlers first and only then touches in-memory state (worker handles,
//! channel pool, schedule index), so a crash between the two is repaired by
//! [`DispatchEngine::recover`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use outreach_campaign::application::command_handlers::{
    CampaignCommandResult, handle_activate_campaign, handle_cancel_campaign,
    handle_create_campaign, handle_pause_campaign, handle_resume_campaign, handle_start_campaign,
    load_campaign,
};
use outreach_campaign::domain::aggregates::CampaignStatus;
use outreach_campaign::domain::commands::{
    ActivateCampaign, CancelCampaign, CreateCampaign, PauseCampaign, ResumeCampaign,
    StartCampaign,
};
use outreach_campaign::domain::events::CAMPAIGN_CREATED_EVENT_TYPE;
use outreach_campaign::domain::outcome::CampaignProgress;
use outreach_channel::application::command_handlers::{
    handle_change_connection_state, handle_register_channel, load_channel,
};
use outreach_channel::application::query_handlers::ChannelView;
use outreach_channel::domain::commands::{ChangeConnectionState, RegisterChannel};
use outreach_channel::domain::events::CHANNEL_REGISTERED_EVENT_TYPE;
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use outreach_core::repository::{EventRepository, StoredEvent};
use outreach_core::rng::DeterministicRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::channel_pool::ChannelPool;
use crate::config::DispatchConfig;
use crate::context::DispatchContext;
use crate::driver::ChannelDriver;
use crate::progress::ProgressAggregator;
use crate::worker::{Worker, WorkerExit};

const MAX_CONTROL_RETRIES: u32 = 5;

struct WorkerHandle {
    status_tx: watch::Sender<CampaignStatus>,
    exit_rx: watch::Receiver<Option<WorkerExit>>,
    task: JoinHandle<()>,
}

/// What [`DispatchEngine::recover`] brought back.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Channels loaded into the pool.
    pub channels: usize,
    /// Running campaigns whose worker was restarted.
    pub resumed: Vec<Uuid>,
    /// Scheduled campaigns waiting for their start time.
    pub scheduled: Vec<Uuid>,
}

/// Owns the shared dispatch context, one worker per running campaign and the
/// index of scheduled start times.
pub struct DispatchEngine {
    ctx: Arc<DispatchContext>,
    workers: Mutex<HashMap<Uuid, WorkerHandle>>,
    schedule: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("workers", &lock(&self.workers).len())
            .field("scheduled", &lock(&self.schedule).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs a control operation, retrying when it loses the optimistic
/// concurrency race against a worker recording outcomes.
async fn with_conflict_retry<T, F, Fut>(mut operation: F) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_conflict() && attempt < MAX_CONTROL_RETRIES => {
                attempt += 1;
                tokio::task::yield_now().await;
            }
            result => return result,
        }
    }
}

impl DispatchEngine {
    /// Builds an engine around the given collaborators. Nothing runs until a
    /// campaign is started or [`recover`](Self::recover) is called.
    #[must_use]
    pub fn new(
        repo: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
        driver: Arc<dyn ChannelDriver>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(DispatchContext::new(repo, clock, rng, driver, config)),
            workers: Mutex::new(HashMap::new()),
            schedule: Mutex::new(HashMap::new()),
        }
    }

    /// The global channel pool.
    #[must_use]
    pub fn pool(&self) -> &ChannelPool {
        &self.ctx.pool
    }

    /// The live progress counters.
    #[must_use]
    pub fn progress_aggregator(&self) -> &ProgressAggregator {
        &self.ctx.progress
    }

    /// The dispatch tunables.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.ctx.config
    }

    fn repo(&self) -> &dyn EventRepository {
        self.ctx.repo.as_ref()
    }

    fn clock(&self) -> &dyn Clock {
        self.ctx.clock.as_ref()
    }

    /// Creates a campaign in `draft` (or `scheduled` for a future start).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for invalid definitions, or a
    /// repository error.
    pub async fn create_campaign(
        &self,
        command: &CreateCampaign,
    ) -> Result<CampaignCommandResult, DomainError> {
        let result = handle_create_campaign(command, self.clock(), self.repo()).await?;
        self.ctx.progress.seed(
            result.aggregate_id,
            CampaignProgress::new(command.definition.total_contacts()),
        );
        if result.status == CampaignStatus::Scheduled {
            if let Some(at) = command.definition.scheduled_at {
                self.schedule_at(result.aggregate_id, at);
            }
        }
        info!(campaign_id = %result.aggregate_id, status = %result.status, "campaign created");
        Ok(result)
    }

    /// Starts a draft campaign: runs it now, or parks it until
    /// `scheduled_at`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless the campaign is a
    /// draft, or a repository error.
    pub async fn start_campaign(
        &self,
        command: &StartCampaign,
    ) -> Result<CampaignCommandResult, DomainError> {
        let result = with_conflict_retry(move || {
            handle_start_campaign(command, self.clock(), self.repo())
        })
        .await?;
        match result.status {
            CampaignStatus::Running => {
                self.ensure_worker(result.aggregate_id, CampaignStatus::Running);
            }
            CampaignStatus::Scheduled => {
                let campaign = load_campaign(result.aggregate_id, self.repo()).await?;
                if let Some(at) = campaign.scheduled_at() {
                    self.schedule_at(result.aggregate_id, at);
                }
            }
            _ => {}
        }
        info!(campaign_id = %result.aggregate_id, status = %result.status, "campaign started");
        Ok(result)
    }

    /// Pauses a running campaign. The in-flight dispatch finishes; nothing
    /// new starts.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless running.
    pub async fn pause_campaign(
        &self,
        command: &PauseCampaign,
    ) -> Result<CampaignCommandResult, DomainError> {
        let result = with_conflict_retry(move || {
            handle_pause_campaign(command, self.clock(), self.repo())
        })
        .await?;
        self.publish(result.aggregate_id, result.status);
        info!(campaign_id = %result.aggregate_id, "campaign paused");
        Ok(result)
    }

    /// Resumes a paused campaign from its next unprocessed recipient.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` unless paused.
    pub async fn resume_campaign(
        &self,
        command: &ResumeCampaign,
    ) -> Result<CampaignCommandResult, DomainError> {
        let result = with_conflict_retry(move || {
            handle_resume_campaign(command, self.clock(), self.repo())
        })
        .await?;
        self.ensure_worker(result.aggregate_id, result.status);
        info!(campaign_id = %result.aggregate_id, "campaign resumed");
        Ok(result)
    }

    /// Cancels a scheduled, running or paused campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` from draft or terminal states.
    pub async fn cancel_campaign(
        &self,
        command: &CancelCampaign,
    ) -> Result<CampaignCommandResult, DomainError> {
        let result = with_conflict_retry(move || {
            handle_cancel_campaign(command, self.clock(), self.repo())
        })
        .await?;
        lock(&self.schedule).remove(&result.aggregate_id);
        self.publish(result.aggregate_id, result.status);
        info!(campaign_id = %result.aggregate_id, "campaign cancelled");
        Ok(result)
    }

    /// Registers a channel and makes it available to the pool.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for blank names or duplicate ids.
    pub async fn register_channel(
        &self,
        command: &RegisterChannel,
    ) -> Result<(ChannelView, Vec<StoredEvent>), DomainError> {
        let (channel, events) = handle_register_channel(command, self.clock(), self.repo()).await?;
        self.ctx
            .pool
            .upsert(channel.id, channel.kind, channel.connection_state);
        info!(channel_id = %channel.id, kind = ?channel.kind, "channel registered");
        Ok((ChannelView::from(&channel), events))
    }

    /// Records a connection state change and applies it to the pool.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for unknown channels or
    /// `DomainError::Validation` if the state is unchanged.
    pub async fn change_channel_state(
        &self,
        command: &ChangeConnectionState,
    ) -> Result<(ChannelView, Vec<StoredEvent>), DomainError> {
        let (channel, events) =
            handle_change_connection_state(command, self.clock(), self.repo()).await?;
        self.ctx
            .pool
            .upsert(channel.id, channel.kind, channel.connection_state);
        info!(
            channel_id = %channel.id,
            state = %channel.connection_state,
            "channel connection state changed"
        );
        Ok((ChannelView::from(&channel), events))
    }

    /// Rebuilds in-memory state from the event store: every channel goes
    /// back into the pool, every running campaign gets a worker (which skips
    /// recipients with recorded outcomes) and every scheduled campaign goes
    /// back into the schedule index.
    ///
    /// # Errors
    ///
    /// Returns the first repository or deserialization error.
    pub async fn recover(&self) -> Result<RecoveryReport, DomainError> {
        let mut report = RecoveryReport::default();

        let channel_ids = self
            .repo()
            .aggregate_ids_by_event_type(CHANNEL_REGISTERED_EVENT_TYPE)
            .await?;
        for channel_id in channel_ids {
            let channel = load_channel(channel_id, self.repo()).await?;
            self.ctx
                .pool
                .upsert(channel.id, channel.kind, channel.connection_state);
            report.channels += 1;
        }

        let campaign_ids = self
            .repo()
            .aggregate_ids_by_event_type(CAMPAIGN_CREATED_EVENT_TYPE)
            .await?;
        for campaign_id in campaign_ids {
            let campaign = load_campaign(campaign_id, self.repo()).await?;
            self.ctx.progress.seed(campaign_id, campaign.progress());
            match campaign.status() {
                CampaignStatus::Running => {
                    self.ensure_worker(campaign_id, CampaignStatus::Running);
                    report.resumed.push(campaign_id);
                }
                CampaignStatus::Scheduled => {
                    if let Some(at) = campaign.scheduled_at() {
                        self.schedule_at(campaign_id, at);
                        report.scheduled.push(campaign_id);
                    }
                }
                _ => {}
            }
        }

        info!(
            channels = report.channels,
            resumed = report.resumed.len(),
            scheduled = report.scheduled.len(),
            "dispatch engine recovered"
        );
        Ok(report)
    }

    /// Activates every scheduled campaign whose start time has been reached.
    /// Safe to call repeatedly; returns the campaigns started by this call.
    ///
    /// # Errors
    ///
    /// Never fails as a whole: per-campaign errors are logged and the
    /// campaign is retried on the next call.
    pub async fn activate_due(&self) -> Result<Vec<Uuid>, DomainError> {
        let due: Vec<Uuid> = {
            let schedule = lock(&self.schedule);
            schedule
                .iter()
                .filter(|(_, at)| self.clock().has_reached(**at))
                .map(|(id, _)| *id)
                .collect()
        };

        let mut activated = Vec::new();
        for campaign_id in due {
            let command = &ActivateCampaign {
                correlation_id: Uuid::new_v4(),
                campaign_id,
            };
            let result = with_conflict_retry(move || {
                handle_activate_campaign(command, self.clock(), self.repo())
            })
            .await;
            match result {
                Ok(result) => {
                    lock(&self.schedule).remove(&campaign_id);
                    if !result.stored_events.is_empty() {
                        info!(%campaign_id, "scheduled campaign activated");
                        activated.push(campaign_id);
                    }
                    self.ensure_worker(campaign_id, CampaignStatus::Running);
                }
                Err(DomainError::InvalidTransition(_) | DomainError::AggregateNotFound(_)) => {
                    lock(&self.schedule).remove(&campaign_id);
                }
                Err(e) => warn!(%campaign_id, error = %e, "activation deferred"),
            }
        }
        Ok(activated)
    }

    /// Returns live progress, falling back to the persisted outcomes for
    /// campaigns this engine has not seen yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for unknown campaigns.
    pub async fn progress(&self, campaign_id: Uuid) -> Result<CampaignProgress, DomainError> {
        if let Some(progress) = self.ctx.progress.snapshot(campaign_id) {
            return Ok(progress);
        }
        let campaign = load_campaign(campaign_id, self.repo()).await?;
        let progress = campaign.progress();
        self.ctx.progress.seed(campaign_id, progress);
        Ok(progress)
    }

    /// Returns `true` while a worker for the campaign is alive.
    #[must_use]
    pub fn is_dispatching(&self, campaign_id: Uuid) -> bool {
        lock(&self.workers)
            .get(&campaign_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Returns `true` if the campaign is waiting in the schedule index.
    #[must_use]
    pub fn is_scheduled(&self, campaign_id: Uuid) -> bool {
        lock(&self.schedule).contains_key(&campaign_id)
    }

    /// Waits for the campaign's current worker to exit. Returns `None` if no
    /// worker was ever started for it.
    pub async fn join(&self, campaign_id: Uuid) -> Option<WorkerExit> {
        let mut exit_rx = lock(&self.workers).get(&campaign_id)?.exit_rx.clone();
        let exit = exit_rx.wait_for(Option::is_some).await.ok()?;
        exit.clone()
    }

    /// Stops every worker: no new dispatch starts, pacing waits are
    /// abandoned, in-flight sends finish and are recorded. Campaigns keep
    /// their persisted status and are picked up by the next `recover`.
    pub async fn shutdown(&self) {
        self.ctx.shutdown.cancel();
        let handles: Vec<(Uuid, WorkerHandle)> = lock(&self.workers).drain().collect();
        for (campaign_id, handle) in handles {
            if let Err(e) = handle.task.await {
                warn!(%campaign_id, error = %e, "dispatch worker did not stop cleanly");
            }
        }
        info!("dispatch engine stopped");
    }

    fn schedule_at(&self, campaign_id: Uuid, at: DateTime<Utc>) {
        lock(&self.schedule).insert(campaign_id, at);
        info!(%campaign_id, scheduled_at = %at, "campaign scheduled");
    }

    fn publish(&self, campaign_id: Uuid, status: CampaignStatus) {
        if let Some(handle) = lock(&self.workers).get(&campaign_id) {
            handle.status_tx.send_replace(status);
        }
    }

    /// Publishes `status` to the campaign's live worker, or starts a new one.
    fn ensure_worker(&self, campaign_id: Uuid, status: CampaignStatus) {
        if self.ctx.shutdown.is_cancelled() {
            return;
        }
        let mut workers = lock(&self.workers);
        if let Some(handle) = workers.get(&campaign_id) {
            if !handle.task.is_finished() {
                handle.status_tx.send_replace(status);
                return;
            }
        }

        let (status_tx, status_rx) = watch::channel(status);
        let (exit_tx, exit_rx) = watch::channel(None);
        let ctx = Arc::clone(&self.ctx);
        let span = info_span!("dispatch_worker", %campaign_id);
        let task = tokio::spawn(
            async move {
                let exit = match Worker::load(ctx, campaign_id, status_rx).await {
                    Ok(worker) => worker.run().await,
                    Err(e) => {
                        warn!(error = %e, "dispatch worker could not load campaign");
                        WorkerExit::Errored(e.to_string())
                    }
                };
                exit_tx.send_replace(Some(exit));
            }
            .instrument(span),
        );
        workers.insert(
            campaign_id,
            WorkerHandle {
                status_tx,
                exit_rx,
                task,
            },
        );
    }
}
