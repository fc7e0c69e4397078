//! Shared application state.

use std::sync::Arc;

use outreach_core::clock::Clock;
use outreach_core::repository::EventRepository;
use outreach_dispatch::{DispatchEngine, InMemoryContactRegistry};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock used for command timestamps.
    pub clock: Arc<dyn Clock>,
    /// Event store backing every aggregate.
    pub event_repository: Arc<dyn EventRepository>,
    /// The dispatch engine driving running campaigns.
    pub engine: Arc<DispatchEngine>,
    /// Uploaded contact lists.
    pub contacts: Arc<InMemoryContactRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_repository: Arc<dyn EventRepository>,
        engine: Arc<DispatchEngine>,
        contacts: Arc<InMemoryContactRegistry>,
    ) -> Self {
        Self {
            clock,
            event_repository,
            engine,
            contacts,
        }
    }
}
