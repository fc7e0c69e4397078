//! The dispatch worker loop: one instance per running campaign.
//!
//! The loop owns the campaign aggregate and is the only writer of
//! `campaign.dispatch_recorded` events. Control operations (pause, resume,
//! cancel) are persisted by the engine and published on a watch channel; the
//! worker observes them between iterations and reloads its aggregate whenever
//! an append loses the optimistic-concurrency race.
//!
//! Each dispatch runs in its own task holding a [`ChannelLease`], so one
//! campaign can keep several channels busy at once while every channel still
//! serves a single dispatch at a time. Outcomes are recorded one by one on the
//! loop itself, in completion order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use outreach_campaign::application::command_handlers::{load_campaign, save_campaign};
use outreach_campaign::domain::aggregates::{Campaign, CampaignStatus};
use outreach_campaign::domain::definition::{ContentPayload, DistributionMode, Pacing, Recipient};
use outreach_campaign::domain::outcome::{DispatchOutcome, TaskResolution};
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::channel_pool::{AcquireError, ChannelLease};
use crate::context::DispatchContext;
use crate::driver::{ChannelTarget, DriverError};
use crate::pacing;

const MAX_CONFLICT_RETRIES: u32 = 5;

/// How a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every recipient was processed and the campaign completed.
    Completed,
    /// The campaign failed (channels exhausted).
    Failed,
    /// The campaign was cancelled; in-flight dispatches were recorded.
    Cancelled,
    /// The engine shut down; the campaign stays `running` for the next start.
    Stopped,
    /// Persistence failed; the campaign stays `running` for the next recovery.
    Errored(String),
}

#[derive(Debug, Clone, Copy)]
struct PendingTask {
    recipient_index: usize,
    attempts: u32,
}

#[derive(Debug)]
enum TaskResult {
    /// Gave up its pacing slot before sending anything.
    Abandoned,
    /// Transient driver error with attempts left.
    Retry(String),
    Finished {
        outcome: DispatchOutcome,
        reason: Option<String>,
    },
}

#[derive(Debug)]
struct TaskReport {
    task: PendingTask,
    channel_id: Uuid,
    result: TaskResult,
}

/// Position in the recipient list plus recipients put back for another try.
#[derive(Debug)]
struct Cursor {
    next_index: usize,
    total: usize,
    requeued: VecDeque<PendingTask>,
}

impl Cursor {
    fn new(total: usize) -> Self {
        Self {
            next_index: 0,
            total,
            requeued: VecDeque::new(),
        }
    }

    /// Next recipient without a persisted outcome. Re-queued recipients go
    /// first.
    fn next(&mut self, campaign: &Campaign) -> Option<PendingTask> {
        if let Some(task) = self.requeued.pop_front() {
            return Some(task);
        }
        while self.next_index < self.total {
            let recipient_index = self.next_index;
            self.next_index += 1;
            if !campaign.is_recorded(recipient_index) {
                return Some(PendingTask {
                    recipient_index,
                    attempts: 0,
                });
            }
        }
        None
    }

    fn requeue(&mut self, task: PendingTask) {
        self.requeued.push_front(task);
    }

    fn is_drained(&self, campaign: &Campaign) -> bool {
        self.requeued.is_empty() && (self.next_index..self.total).all(|i| campaign.is_recorded(i))
    }
}

enum Wake {
    Joined(Result<(Id, TaskReport), JoinError>),
    Status(bool),
    Timer,
    Shutdown,
}

pub(crate) struct Worker {
    ctx: Arc<DispatchContext>,
    campaign: Campaign,
    campaign_id: Uuid,
    correlation_id: Uuid,
    channel_ids: Vec<Uuid>,
    mode: DistributionMode,
    pacing: Pacing,
    status: CampaignStatus,
    status_rx: watch::Receiver<CampaignStatus>,
    cursor: Cursor,
    in_flight: JoinSet<TaskReport>,
    in_flight_tasks: HashMap<Id, PendingTask>,
    busy_backoff: Duration,
    unavailable_streak: u32,
}

impl Worker {
    /// Loads the campaign and prepares a worker positioned at its first
    /// unprocessed recipient.
    pub(crate) async fn load(
        ctx: Arc<DispatchContext>,
        campaign_id: Uuid,
        status_rx: watch::Receiver<CampaignStatus>,
    ) -> Result<Self, DomainError> {
        let campaign = load_campaign(campaign_id, ctx.repo.as_ref()).await?;
        let definition = campaign
            .definition()
            .ok_or(DomainError::AggregateNotFound(campaign_id))?;
        let channel_ids = definition.channel_ids.clone();
        let mode = definition.distribution_mode;
        let pacing = definition.pacing;
        let cursor = Cursor::new(definition.total_contacts());
        ctx.progress.seed(campaign_id, campaign.progress());
        let busy_backoff = ctx.config.busy_backoff;
        Ok(Self {
            status: campaign.status(),
            campaign,
            campaign_id,
            correlation_id: Uuid::new_v4(),
            channel_ids,
            mode,
            pacing,
            status_rx,
            cursor,
            in_flight: JoinSet::new(),
            in_flight_tasks: HashMap::new(),
            busy_backoff,
            unavailable_streak: 0,
            ctx,
        })
    }

    /// Runs until the campaign leaves the active states, the engine shuts
    /// down, or persistence fails.
    pub(crate) async fn run(mut self) -> WorkerExit {
        let progress = self.campaign.progress();
        info!(
            completed = progress.completed_calls,
            total = progress.total_contacts,
            "dispatch worker started"
        );

        let exit = loop {
            if self.ctx.shutdown.is_cancelled() {
                break WorkerExit::Stopped;
            }
            self.observe_status();
            let step = match self.status {
                CampaignStatus::Running => self.dispatch_step().await,
                CampaignStatus::Cancelled => Ok(Some(WorkerExit::Cancelled)),
                CampaignStatus::Completed => Ok(Some(WorkerExit::Completed)),
                CampaignStatus::Failed => Ok(Some(WorkerExit::Failed)),
                CampaignStatus::Draft | CampaignStatus::Scheduled | CampaignStatus::Paused => {
                    self.wait_for_progress(None).await
                }
            };
            match step {
                Ok(Some(exit)) => break exit,
                Ok(None) => {}
                Err(e) => return self.abort(&e),
            }
        };

        if let Err(e) = self.drain().await {
            return self.abort(&e);
        }
        info!(exit = ?exit, "dispatch worker stopped");
        exit
    }

    fn abort(&mut self, error: &DomainError) -> WorkerExit {
        error!(error = %error, "dispatch worker stopped on persistence failure");
        self.in_flight.detach_all();
        WorkerExit::Errored(error.to_string())
    }

    fn observe_status(&mut self) {
        if self.status_rx.has_changed().unwrap_or(false) {
            self.adopt_status();
        }
    }

    fn adopt_status(&mut self) {
        self.status = *self.status_rx.borrow_and_update();
        debug!(status = %self.status, "status change observed");
    }

    fn task_input(&self, recipient_index: usize) -> Option<(Recipient, ContentPayload)> {
        let definition = self.campaign.definition()?;
        let recipient = definition.recipients.get(recipient_index)?.clone();
        Some((recipient, definition.payload_for(recipient_index).clone()))
    }

    /// Starts as many dispatches as there are free channels, completes the
    /// campaign once nothing is left, otherwise waits for something to
    /// happen.
    async fn dispatch_step(&mut self) -> Result<Option<WorkerExit>, DomainError> {
        let mut backoff = None;
        while let Some(task) = self.cursor.next(&self.campaign) {
            let Some((recipient, payload)) = self.task_input(task.recipient_index) else {
                return Err(DomainError::Infrastructure(format!(
                    "recipient {} missing from campaign {}",
                    task.recipient_index, self.campaign_id
                )));
            };
            if !recipient.has_dialable_address() {
                self.record(TaskResolution {
                    recipient_index: task.recipient_index,
                    channel_id: None,
                    outcome: DispatchOutcome::Skipped,
                    attempts: task.attempts,
                    reason: Some("address has no digits".into()),
                })
                .await?;
                continue;
            }

            let ctx = Arc::clone(&self.ctx);
            let acquired =
                ctx.with_rng(|rng| ctx.pool.acquire(&self.channel_ids, self.mode, rng));
            match acquired {
                Ok(lease) => {
                    self.busy_backoff = self.ctx.config.busy_backoff;
                    self.unavailable_streak = 0;
                    self.spawn(task, recipient, payload, lease);
                }
                Err(AcquireError::Busy) => {
                    self.cursor.requeue(task);
                    self.unavailable_streak = 0;
                    backoff = Some(self.busy_backoff);
                    self.busy_backoff =
                        (self.busy_backoff * 2).min(self.ctx.config.busy_backoff_max);
                    break;
                }
                Err(AcquireError::Unavailable) => {
                    self.cursor.requeue(task);
                    self.unavailable_streak += 1;
                    if self.unavailable_streak > self.ctx.config.exhausted_retries {
                        return self.fail_channels_exhausted().await;
                    }
                    warn!(
                        attempt = self.unavailable_streak,
                        budget = self.ctx.config.exhausted_retries,
                        "no connected channel; backing off"
                    );
                    backoff = Some(self.ctx.config.exhausted_backoff);
                    break;
                }
            }
        }

        if self.in_flight.is_empty() && self.cursor.is_drained(&self.campaign) {
            return self.complete().await;
        }
        self.wait_for_progress(backoff).await
    }

    fn spawn(
        &mut self,
        task: PendingTask,
        recipient: Recipient,
        payload: ContentPayload,
        lease: ChannelLease,
    ) {
        let ctx = Arc::clone(&self.ctx);
        let status_rx = self.status_rx.clone();
        let pacing = self.pacing;
        let handle = self.in_flight.spawn(
            run_task(ctx, lease, task, recipient, payload, pacing, status_rx)
                .instrument(tracing::Span::current()),
        );
        self.in_flight_tasks.insert(handle.id(), task);
    }

    /// Waits for a dispatch to finish, a status change, the back-off timer or
    /// shutdown, whichever comes first.
    async fn wait_for_progress(
        &mut self,
        backoff: Option<Duration>,
    ) -> Result<Option<WorkerExit>, DomainError> {
        let timer = async {
            match backoff {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        let wake = tokio::select! {
            Some(joined) = self.in_flight.join_next_with_id(), if !self.in_flight.is_empty() => {
                Wake::Joined(joined)
            }
            changed = self.status_rx.changed() => Wake::Status(changed.is_ok()),
            () = timer => Wake::Timer,
            () = self.ctx.shutdown.cancelled() => Wake::Shutdown,
        };
        match wake {
            Wake::Joined(joined) => self.settle(joined).await?,
            // The engine dropped its handle; nobody can steer this worker.
            Wake::Status(false) => return Ok(Some(WorkerExit::Stopped)),
            // `changed()` already marked the value seen; adopt it here or it is lost.
            Wake::Status(true) => self.adopt_status(),
            Wake::Timer | Wake::Shutdown => {}
        }
        Ok(None)
    }

    async fn drain(&mut self) -> Result<(), DomainError> {
        while let Some(joined) = self.in_flight.join_next_with_id().await {
            self.settle(joined).await?;
        }
        Ok(())
    }

    async fn settle(
        &mut self,
        joined: Result<(Id, TaskReport), JoinError>,
    ) -> Result<(), DomainError> {
        let report = match joined {
            Ok((id, report)) => {
                self.in_flight_tasks.remove(&id);
                report
            }
            Err(join_error) => {
                let Some(task) = self.in_flight_tasks.remove(&join_error.id()) else {
                    return Ok(());
                };
                error!(
                    recipient_index = task.recipient_index,
                    error = %join_error,
                    "dispatch task crashed"
                );
                let task = PendingTask {
                    attempts: task.attempts + 1,
                    ..task
                };
                if task.attempts < self.ctx.config.max_attempts {
                    self.cursor.requeue(task);
                    return Ok(());
                }
                return self
                    .record(TaskResolution {
                        recipient_index: task.recipient_index,
                        channel_id: None,
                        outcome: DispatchOutcome::Failed,
                        attempts: task.attempts,
                        reason: Some(format!("dispatch task crashed: {join_error}")),
                    })
                    .await;
            }
        };

        match report.result {
            TaskResult::Abandoned => {
                debug!(
                    recipient_index = report.task.recipient_index,
                    "pacing wait abandoned; recipient re-queued"
                );
                self.cursor.requeue(report.task);
                Ok(())
            }
            TaskResult::Retry(reason) => {
                warn!(
                    recipient_index = report.task.recipient_index,
                    attempts = report.task.attempts,
                    %reason,
                    "retryable send error; recipient re-queued"
                );
                self.cursor.requeue(report.task);
                Ok(())
            }
            TaskResult::Finished { outcome, reason } => {
                self.record(TaskResolution {
                    recipient_index: report.task.recipient_index,
                    channel_id: Some(report.channel_id),
                    outcome,
                    attempts: report.task.attempts,
                    reason,
                })
                .await
            }
        }
    }

    /// Persists one terminal outcome and counts it.
    async fn record(&mut self, resolution: TaskResolution) -> Result<(), DomainError> {
        let recipient_index = resolution.recipient_index;
        let outcome = resolution.outcome;
        let result = self
            .persist(|campaign, correlation_id, clock| {
                campaign.record_dispatch(resolution.clone(), correlation_id, clock)
            })
            .await;
        match result {
            Ok(()) => {
                self.ctx.progress.record_outcome(self.campaign_id, outcome);
                debug!(recipient_index, outcome = ?outcome, "dispatch recorded");
                Ok(())
            }
            Err(DomainError::Validation(_)) if self.campaign.is_recorded(recipient_index) => {
                debug!(recipient_index, "outcome already recorded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn complete(&mut self) -> Result<Option<WorkerExit>, DomainError> {
        match self
            .persist(|campaign, correlation_id, clock| campaign.complete(correlation_id, clock))
            .await
        {
            Ok(()) => {
                let progress = self.campaign.progress();
                info!(
                    total = progress.total_contacts,
                    answer_rate = progress.answer_rate,
                    "campaign completed"
                );
                Ok(Some(WorkerExit::Completed))
            }
            Err(DomainError::InvalidTransition(reason)) => {
                debug!(%reason, "completion deferred");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn fail_channels_exhausted(&mut self) -> Result<Option<WorkerExit>, DomainError> {
        let reason = format!(
            "channels exhausted: no connected channel after {} attempts",
            self.ctx.config.exhausted_retries
        );
        error!(%reason, "campaign failing");
        self.drain().await?;
        match self
            .persist(|campaign, correlation_id, clock| {
                campaign.fail(&reason, correlation_id, clock)
            })
            .await
        {
            Ok(()) => Ok(Some(WorkerExit::Failed)),
            Err(DomainError::InvalidTransition(detail)) => {
                debug!(%detail, "failure superseded by an operator transition");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Applies `change` to the campaign and appends the resulting events.
    /// A lost concurrency race, or a change rejected by a possibly stale
    /// aggregate, reloads the campaign and tries again.
    async fn persist<F>(&mut self, mut change: F) -> Result<(), DomainError>
    where
        F: FnMut(&mut Campaign, Uuid, &dyn Clock) -> Result<(), DomainError>,
    {
        let mut conflicts = 0;
        let mut reloaded = false;
        loop {
            let clock = self.ctx.clock.as_ref();
            if let Err(e) = change(&mut self.campaign, self.correlation_id, clock) {
                if reloaded {
                    return Err(e);
                }
                self.reload().await?;
                reloaded = true;
                continue;
            }
            match save_campaign(&mut self.campaign, self.ctx.repo.as_ref()).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() && conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    debug!(conflicts, "campaign stream moved on; reloading");
                    self.reload().await?;
                    reloaded = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reload(&mut self) -> Result<(), DomainError> {
        self.campaign = load_campaign(self.campaign_id, self.ctx.repo.as_ref()).await?;
        self.status = self.campaign.status();
        Ok(())
    }
}

/// One dispatch: wait out the channel's pacing delay, then call the driver.
/// The lease is held for the whole task and released on return.
async fn run_task(
    ctx: Arc<DispatchContext>,
    mut lease: ChannelLease,
    mut task: PendingTask,
    recipient: Recipient,
    payload: ContentPayload,
    pacing: Pacing,
    mut status_rx: watch::Receiver<CampaignStatus>,
) -> TaskReport {
    let channel_id = lease.channel_id();
    let abandoned = |task| TaskReport {
        task,
        channel_id,
        result: TaskResult::Abandoned,
    };

    let delay = ctx.with_rng(|rng| pacing::next_delay(&pacing, rng));
    if let Some(ready_at) = lease.last_dispatch().map(|previous| previous + delay) {
        if ready_at > Instant::now() {
            tokio::select! {
                () = tokio::time::sleep_until(ready_at) => {}
                _ = status_rx.wait_for(|status| *status != CampaignStatus::Running) => {
                    return abandoned(task);
                }
                () = ctx.shutdown.cancelled() => return abandoned(task),
            }
        }
    }
    if *status_rx.borrow() != CampaignStatus::Running || ctx.shutdown.is_cancelled() {
        return abandoned(task);
    }

    let target = ChannelTarget {
        channel_id,
        kind: lease.kind(),
    };
    lease.mark_dispatched(Instant::now());
    task.attempts += 1;
    debug!(
        recipient_index = task.recipient_index,
        %channel_id,
        attempt = task.attempts,
        "dispatching"
    );

    let result = match ctx.driver.send(&target, &recipient.address, &payload).await {
        Ok(report) if report.outcome.is_terminal() => TaskResult::Finished {
            outcome: report.outcome,
            reason: report.detail,
        },
        Ok(_) => TaskResult::Finished {
            outcome: DispatchOutcome::Failed,
            reason: Some("driver reported a non-terminal outcome".into()),
        },
        Err(DriverError::Retryable(reason)) if task.attempts < ctx.config.max_attempts => {
            TaskResult::Retry(reason)
        }
        Err(DriverError::Retryable(reason)) => TaskResult::Finished {
            outcome: DispatchOutcome::Failed,
            reason: Some(format!("gave up after {} attempts: {reason}", task.attempts)),
        },
        Err(DriverError::Fatal(reason)) => TaskResult::Finished {
            outcome: DispatchOutcome::Failed,
            reason: Some(reason),
        },
        Err(DriverError::InvalidRecipient(reason)) => TaskResult::Finished {
            outcome: DispatchOutcome::Skipped,
            reason: Some(reason),
        },
    };
    drop(lease);

    TaskReport {
        task,
        channel_id,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use outreach_campaign::domain::definition::CampaignDefinition;
    use outreach_core::aggregate::AggregateRoot;
    use outreach_test_support::FixedClock;

    fn campaign_with(recipients: usize, recorded: &[usize]) -> Campaign {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let mut campaign = Campaign::new(Uuid::new_v4());
        campaign
            .create(
                CampaignDefinition {
                    name: "cursor".into(),
                    recipients: (0..recipients)
                        .map(|i| Recipient {
                            id: Uuid::new_v4(),
                            display_name: format!("r{i}"),
                            address: format!("+1555000{i:04}"),
                        })
                        .collect(),
                    content_variants: vec![ContentPayload::Text { body: "x".into() }],
                    channel_ids: vec![Uuid::new_v4()],
                    pacing: Pacing::fixed(0),
                    distribution_mode: DistributionMode::Single,
                    scheduled_at: None,
                },
                Uuid::new_v4(),
                &clock,
            )
            .unwrap();
        campaign.commit();
        campaign.start(Uuid::new_v4(), &clock).unwrap();
        campaign.commit();
        for &recipient_index in recorded {
            campaign
                .record_dispatch(
                    TaskResolution {
                        recipient_index,
                        channel_id: None,
                        outcome: DispatchOutcome::Delivered,
                        attempts: 1,
                        reason: None,
                    },
                    Uuid::new_v4(),
                    &clock,
                )
                .unwrap();
        }
        campaign.commit();
        campaign
    }

    #[test]
    fn test_cursor_skips_recorded_recipients() {
        // Arrange
        let campaign = campaign_with(5, &[0, 2, 3]);
        let mut cursor = Cursor::new(5);

        // Act
        let first = cursor.next(&campaign).unwrap();
        let second = cursor.next(&campaign).unwrap();

        // Assert
        assert_eq!(first.recipient_index, 1);
        assert_eq!(second.recipient_index, 4);
        assert!(cursor.next(&campaign).is_none());
    }

    #[test]
    fn test_cursor_requeued_task_comes_first_and_keeps_attempts() {
        // Arrange
        let campaign = campaign_with(3, &[]);
        let mut cursor = Cursor::new(3);
        let _ = cursor.next(&campaign);
        let mut second = cursor.next(&campaign).unwrap();
        second.attempts = 2;

        // Act
        cursor.requeue(second);
        let next = cursor.next(&campaign).unwrap();

        // Assert
        assert_eq!(next.recipient_index, 1);
        assert_eq!(next.attempts, 2);
        assert!(!cursor.is_drained(&campaign));
    }

    #[test]
    fn test_cursor_is_drained_only_when_everything_recorded() {
        // Arrange
        let campaign = campaign_with(2, &[0, 1]);
        let mut cursor = Cursor::new(2);

        // Act
        let next = cursor.next(&campaign);

        // Assert
        assert!(next.is_none());
        assert!(cursor.is_drained(&campaign));
    }
}
