//! Periodic activation of scheduled campaigns.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::DispatchEngine;

/// Polls the engine's schedule index and starts campaigns whose
/// `scheduled_at` has been reached.
#[derive(Debug, Clone)]
pub struct SchedulingTrigger {
    engine: Arc<DispatchEngine>,
    interval: Duration,
}

impl SchedulingTrigger {
    /// Creates a trigger polling every `interval`.
    #[must_use]
    pub fn new(engine: Arc<DispatchEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Creates a trigger using the engine's configured poll interval.
    #[must_use]
    pub fn from_engine(engine: Arc<DispatchEngine>) -> Self {
        let interval = engine.config().scheduler_poll;
        Self::new(engine, interval)
    }

    /// Runs one activation pass.
    pub async fn tick(&self) -> Vec<Uuid> {
        match self.engine.activate_due().await {
            Ok(activated) => {
                if !activated.is_empty() {
                    debug!(count = activated.len(), "scheduled campaigns activated");
                }
                activated
            }
            Err(e) => {
                warn!(error = %e, "scheduling pass failed");
                Vec::new()
            }
        }
    }

    /// Ticks until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis(), "scheduling trigger started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("scheduling trigger stopped");
    }
}
