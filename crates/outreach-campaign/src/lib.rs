//! Campaign bounded context.
//!
//! Responsible for campaign definitions, the campaign lifecycle
//! (draft → scheduled → running → paused/completed/failed/cancelled) and the
//! durable per-recipient dispatch outcomes that act as the resume cursor.

pub mod application;
pub mod domain;
