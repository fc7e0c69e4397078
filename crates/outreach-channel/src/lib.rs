//! Channel bounded context.
//!
//! Channels are the outbound senders (phone lines, messaging accounts) a
//! campaign dispatches through. This crate persists their registration and
//! connection state; the dispatch engine mirrors both into its channel pool.

pub mod application;
pub mod domain;
