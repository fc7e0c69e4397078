//! Global pool of outbound channels with per-channel mutual exclusion.
//!
//! A channel is handed out through a [`ChannelLease`]; the lease releases the
//! channel when dropped, so a panicking or aborted dispatch task can never
//! strand it. Exclusivity is global: two campaigns sharing a channel contend
//! for the same slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use outreach_campaign::domain::definition::DistributionMode;
use outreach_channel::domain::aggregates::{ChannelKind, ConnectionState};
use outreach_core::rng::DeterministicRng;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Why no channel could be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// Every selectable candidate is currently dispatching.
    #[error("all candidate channels are busy")]
    Busy,
    /// No candidate is registered and selectable.
    #[error("no candidate channel is connected")]
    Unavailable,
}

#[derive(Debug)]
struct Slot {
    kind: ChannelKind,
    state: ConnectionState,
    busy: bool,
    last_dispatch: Option<Instant>,
}

/// Shared registry of channel slots. Cloning yields another handle to the
/// same pool.
#[derive(Debug, Clone, Default)]
pub struct ChannelPool {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

impl ChannelPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a channel or refreshes its kind and connection state. A busy
    /// channel stays busy.
    pub fn upsert(&self, channel_id: Uuid, kind: ChannelKind, state: ConnectionState) {
        let mut slots = self.lock();
        let slot = slots.entry(channel_id).or_insert(Slot {
            kind,
            state,
            busy: false,
            last_dispatch: None,
        });
        slot.kind = kind;
        slot.state = state;
    }

    /// Updates the connection state of a known channel. Returns `false` for
    /// unknown channels.
    pub fn set_connection_state(&self, channel_id: Uuid, state: ConnectionState) -> bool {
        match self.lock().get_mut(&channel_id) {
            Some(slot) => {
                slot.state = state;
                true
            }
            None => false,
        }
    }

    /// Returns the connection state of a known channel.
    #[must_use]
    pub fn connection_state(&self, channel_id: Uuid) -> Option<ConnectionState> {
        self.lock().get(&channel_id).map(|slot| slot.state)
    }

    /// Returns `true` while a lease on the channel is outstanding.
    #[must_use]
    pub fn is_busy(&self, channel_id: Uuid) -> bool {
        self.lock().get(&channel_id).is_some_and(|slot| slot.busy)
    }

    /// Acquires one channel among `candidates`.
    ///
    /// `Single` considers only the first candidate. `RandomAcrossChannels`
    /// draws uniformly among the idle, selectable candidates.
    ///
    /// # Errors
    ///
    /// `AcquireError::Unavailable` when no candidate is known and selectable,
    /// `AcquireError::Busy` when every selectable candidate is leased.
    pub fn acquire(
        &self,
        candidates: &[Uuid],
        mode: DistributionMode,
        rng: &mut dyn DeterministicRng,
    ) -> Result<ChannelLease, AcquireError> {
        let mut slots = self.lock();
        let considered = match mode {
            DistributionMode::Single => candidates.get(..1).unwrap_or_default(),
            DistributionMode::RandomAcrossChannels => candidates,
        };

        let selectable: Vec<Uuid> = considered
            .iter()
            .copied()
            .filter(|id| slots.get(id).is_some_and(|slot| slot.state.is_selectable()))
            .collect();
        if selectable.is_empty() {
            return Err(AcquireError::Unavailable);
        }
        let idle: Vec<Uuid> = selectable
            .into_iter()
            .filter(|id| slots.get(id).is_some_and(|slot| !slot.busy))
            .collect();
        let chosen = match idle.len() {
            0 => return Err(AcquireError::Busy),
            1 => idle[0],
            n => {
                let upper = u32::try_from(n - 1).unwrap_or(u32::MAX);
                let pick = rng.next_u32_range(0, upper) as usize;
                idle[pick.min(n - 1)]
            }
        };

        let Some(slot) = slots.get_mut(&chosen) else {
            return Err(AcquireError::Unavailable);
        };
        slot.busy = true;
        debug!(channel_id = %chosen, "channel acquired");
        Ok(ChannelLease {
            pool: self.clone(),
            channel_id: chosen,
            kind: slot.kind,
            last_dispatch: slot.last_dispatch,
        })
    }

    fn release(&self, channel_id: Uuid) {
        if let Some(slot) = self.lock().get_mut(&channel_id) {
            slot.busy = false;
        }
        debug!(%channel_id, "channel released");
    }

    fn mark_dispatched(&self, channel_id: Uuid, at: Instant) {
        if let Some(slot) = self.lock().get_mut(&channel_id) {
            slot.last_dispatch = Some(at);
        }
    }
}

/// Exclusive hold on one channel. Dropping the lease releases the channel.
#[derive(Debug)]
pub struct ChannelLease {
    pool: ChannelPool,
    channel_id: Uuid,
    kind: ChannelKind,
    last_dispatch: Option<Instant>,
}

impl ChannelLease {
    /// The leased channel.
    #[must_use]
    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Kind of the leased channel.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// When the previous dispatch on this channel started, across all
    /// campaigns.
    #[must_use]
    pub fn last_dispatch(&self) -> Option<Instant> {
        self.last_dispatch
    }

    /// Records the start of a dispatch on this channel.
    pub fn mark_dispatched(&mut self, at: Instant) {
        self.last_dispatch = Some(at);
        self.pool.mark_dispatched(self.channel_id, at);
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.pool.release(self.channel_id);
    }
}
