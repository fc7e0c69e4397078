//! Domain model for the Campaign context.

pub mod aggregates;
pub mod commands;
pub mod definition;
pub mod events;
pub mod outcome;
