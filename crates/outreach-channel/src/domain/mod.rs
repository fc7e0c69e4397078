//! Domain model for the Channel context.

pub mod aggregates;
pub mod commands;
pub mod events;
