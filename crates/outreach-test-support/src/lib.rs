//! Shared test doubles for the Outreach dispatch engine.

mod clock;
mod driver;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock};
pub use driver::{ScriptedChannelDriver, SendRecord};
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
pub use rng::{MockRng, SequenceRng};
