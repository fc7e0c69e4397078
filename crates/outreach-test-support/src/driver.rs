//! A `ChannelDriver` whose results are scripted per address.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use outreach_campaign::domain::definition::ContentPayload;
use outreach_campaign::domain::outcome::DispatchOutcome;
use outreach_dispatch::driver::{ChannelDriver, ChannelTarget, DeliveryReport, DriverError};
use tokio::time::Instant;
use uuid::Uuid;

/// One `send` call as observed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    /// Channel the send went out on.
    pub channel_id: Uuid,
    /// Recipient address.
    pub address: String,
    /// When the send started, on the tokio clock.
    pub started_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, VecDeque<Result<DeliveryReport, DriverError>>>,
    sends: Vec<SendRecord>,
    active: HashSet<Uuid>,
    overlaps: usize,
}

/// Replays scripted results per address, falling back to a default outcome.
///
/// Each send takes `latency` on the tokio clock, so tests running with
/// paused time observe in-flight dispatches deterministically. Two sends
/// overlapping on one channel are counted as an overlap.
#[derive(Debug)]
pub struct ScriptedChannelDriver {
    default_outcome: DispatchOutcome,
    latency: Duration,
    state: Mutex<State>,
}

impl Default for ScriptedChannelDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChannelDriver {
    /// A driver that reports `delivered` instantly for every address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_outcome: DispatchOutcome::Delivered,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
        }
    }

    /// Sets the outcome for addresses without a script.
    #[must_use]
    pub fn with_default_outcome(mut self, outcome: DispatchOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// Sets how long each send takes.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues results for `address`; each send consumes one.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn with_script(
        self,
        address: impl Into<String>,
        results: Vec<Result<DeliveryReport, DriverError>>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(address.into())
            .or_default()
            .extend(results);
        self
    }

    /// Every send so far, in start order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sends(&self) -> Vec<SendRecord> {
        self.state.lock().unwrap().sends.clone()
    }

    /// Number of sends made to `address`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn send_count(&self, address: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sends
            .iter()
            .filter(|send| send.address == address)
            .count()
    }

    /// Times a send started on a channel that already had one in flight.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn overlaps(&self) -> usize {
        self.state.lock().unwrap().overlaps
    }

    /// Channels with a send in flight right now.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().active.len()
    }
}

#[async_trait]
impl ChannelDriver for ScriptedChannelDriver {
    async fn send(
        &self,
        channel: &ChannelTarget,
        address: &str,
        _payload: &ContentPayload,
    ) -> Result<DeliveryReport, DriverError> {
        let result = {
            let mut state = self.state.lock().unwrap();
            if !state.active.insert(channel.channel_id) {
                state.overlaps += 1;
            }
            state.sends.push(SendRecord {
                channel_id: channel.channel_id,
                address: address.to_owned(),
                started_at: Instant::now(),
            });
            state
                .scripts
                .get_mut(address)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(DeliveryReport::new(self.default_outcome)))
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.state.lock().unwrap().active.remove(&channel.channel_id);
        result
    }
}
