//! Outreach dispatch: the campaign dispatch engine.
//!
//! One worker loop per running campaign takes the next unprocessed
//! recipient, acquires an idle channel from the shared [`ChannelPool`],
//! waits out the channel's pacing delay and hands the content to the
//! [`ChannelDriver`]. Terminal outcomes are persisted on the campaign's event
//! stream as they complete, which is what makes a restart resume without
//! re-sending.
//!
//! [`DispatchEngine`] is the façade used by the HTTP layer;
//! [`SchedulingTrigger`] activates scheduled campaigns once they are due.

pub mod channel_pool;
pub mod config;
pub mod contacts;
mod context;
pub mod driver;
pub mod engine;
pub mod pacing;
pub mod progress;
pub mod trigger;
pub mod webhook_driver;
mod worker;

pub use channel_pool::{AcquireError, ChannelLease, ChannelPool};
pub use config::DispatchConfig;
pub use contacts::{ContactRegistry, InMemoryContactRegistry};
pub use driver::{ChannelDriver, ChannelTarget, DeliveryReport, DriverError};
pub use engine::{DispatchEngine, RecoveryReport};
pub use progress::ProgressAggregator;
pub use trigger::SchedulingTrigger;
pub use webhook_driver::WebhookChannelDriver;
pub use worker::WorkerExit;
