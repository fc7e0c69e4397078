//! Outreach event store.
//!
//! `PgEventRepository` persists aggregate streams in PostgreSQL;
//! `InMemoryEventRepository` offers the same contract for development runs
//! and tests.

pub mod memory_event_repository;
pub mod pg_event_repository;
pub mod schema;
