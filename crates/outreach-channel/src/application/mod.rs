//! Application layer for the Channel context.

pub mod command_handlers;
pub mod query_handlers;
