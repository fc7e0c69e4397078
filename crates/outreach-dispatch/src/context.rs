//! Collaborators shared by the engine and every worker.

use std::sync::{Arc, Mutex, PoisonError};

use outreach_core::clock::Clock;
use outreach_core::repository::EventRepository;
use outreach_core::rng::DeterministicRng;
use tokio_util::sync::CancellationToken;

use crate::channel_pool::ChannelPool;
use crate::config::DispatchConfig;
use crate::driver::ChannelDriver;
use crate::progress::ProgressAggregator;

pub(crate) struct DispatchContext {
    pub(crate) repo: Arc<dyn EventRepository>,
    pub(crate) clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn DeterministicRng>>,
    pub(crate) pool: ChannelPool,
    pub(crate) driver: Arc<dyn ChannelDriver>,
    pub(crate) progress: Arc<ProgressAggregator>,
    pub(crate) config: DispatchConfig,
    pub(crate) shutdown: CancellationToken,
}

impl DispatchContext {
    pub(crate) fn new(
        repo: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
        driver: Arc<dyn ChannelDriver>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            rng: Mutex::new(rng),
            pool: ChannelPool::new(),
            driver,
            progress: Arc::new(ProgressAggregator::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Runs `f` with exclusive access to the shared RNG. Never hold across an
    /// await point.
    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut dyn DeterministicRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(rng.as_mut())
    }
}
