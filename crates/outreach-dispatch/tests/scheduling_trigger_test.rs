//! Scheduling trigger and recovery of scheduled campaigns.

mod common;

use std::time::Duration;

use common::{Harness, definition, recipients, start_time};
use outreach_campaign::domain::aggregates::CampaignStatus;
use outreach_campaign::domain::definition::{DistributionMode, Pacing};
use outreach_dispatch::{SchedulingTrigger, WorkerExit};
use outreach_test_support::{MockRng, ScriptedChannelDriver};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_tick_activates_only_due_campaigns() {
    // Arrange
    let harness = Harness::new(ScriptedChannelDriver::new());
    let channels = harness.channels(1).await;
    let mut soon = definition(
        recipients(1),
        channels.clone(),
        Pacing::fixed(0),
        DistributionMode::Single,
    );
    soon.scheduled_at = Some(start_time() + chrono::Duration::minutes(5));
    let mut later = definition(recipients(1), channels, Pacing::fixed(0), DistributionMode::Single);
    later.scheduled_at = Some(start_time() + chrono::Duration::hours(2));
    let soon_id = harness.create(soon).await;
    let later_id = harness.create(later).await;
    let trigger = SchedulingTrigger::from_engine(harness.engine.clone());

    // Act
    harness.clock.advance(chrono::Duration::minutes(5));
    let activated = trigger.tick().await;

    // Assert
    assert_eq!(activated, vec![soon_id]);
    assert_eq!(harness.finish(soon_id).await, WorkerExit::Completed);
    assert!(harness.engine.is_scheduled(later_id));
    assert_eq!(harness.view(later_id).await.status, CampaignStatus::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_starts_campaign_once_clock_passes_schedule() {
    // Arrange
    let harness = Harness::new(ScriptedChannelDriver::new());
    let channels = harness.channels(1).await;
    let mut scheduled = definition(
        recipients(2),
        channels,
        Pacing::fixed(0),
        DistributionMode::Single,
    );
    scheduled.scheduled_at = Some(start_time() + chrono::Duration::minutes(10));
    let campaign_id = harness.create(scheduled).await;
    let shutdown = CancellationToken::new();
    let trigger = SchedulingTrigger::new(harness.engine.clone(), Duration::from_millis(100));
    let handle = tokio::spawn(trigger.run(shutdown.clone()));

    // Act
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(harness.driver.sends().is_empty());
    harness.clock.advance(chrono::Duration::minutes(10));
    let exit = harness.finish_after_activation(campaign_id).await;
    shutdown.cancel();
    handle.await.unwrap();

    // Assert
    assert_eq!(exit, WorkerExit::Completed);
    assert_eq!(harness.driver.sends().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_recover_reindexes_scheduled_campaigns() {
    // Arrange
    let first = Harness::new(ScriptedChannelDriver::new());
    let channels = first.channels(1).await;
    let mut scheduled = definition(
        recipients(1),
        channels,
        Pacing::fixed(0),
        DistributionMode::Single,
    );
    scheduled.scheduled_at = Some(start_time() + chrono::Duration::minutes(30));
    let campaign_id = first.create(scheduled).await;
    first.engine.shutdown().await;

    // Act
    let second = Harness::sharing(
        first.repo.clone(),
        first.clock.clone(),
        ScriptedChannelDriver::new(),
        Box::new(MockRng),
    );
    let report = second.engine.recover().await.unwrap();

    // Assert
    assert_eq!(report.scheduled, vec![campaign_id]);
    assert!(report.resumed.is_empty());
    assert!(second.engine.is_scheduled(campaign_id));
    assert!(!second.engine.is_dispatching(campaign_id));
}
