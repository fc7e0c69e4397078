//! `EventRepository` doubles for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;
use outreach_core::error::DomainError;
use outreach_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// Returns the configured stream from every `load_events` call and records
/// every append.
#[derive(Debug)]
pub struct RecordingEventRepository {
    load_result: Mutex<Vec<StoredEvent>>,
    aggregate_ids: Vec<Uuid>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Creates a repository that returns `load_result` for any aggregate.
    ///
    /// # Panics
    ///
    /// Panics if `load_result` is an `Err`; use `FailingEventRepository` for
    /// error scenarios.
    #[must_use]
    pub fn new(load_result: Result<Vec<StoredEvent>, DomainError>) -> Self {
        Self {
            load_result: Mutex::new(load_result.expect(
                "RecordingEventRepository::new does not accept Err; use FailingEventRepository",
            )),
            aggregate_ids: Vec::new(),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Sets the ids returned by `aggregate_ids_by_event_type`, whatever the
    /// requested type.
    #[must_use]
    pub fn with_aggregate_ids(mut self, aggregate_ids: Vec<Uuid>) -> Self {
        self.aggregate_ids = aggregate_ids;
        self
    }

    /// Returns a snapshot of every append call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.load_result.lock().unwrap().clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }

    async fn aggregate_ids_by_event_type(
        &self,
        _event_type: &str,
    ) -> Result<Vec<Uuid>, DomainError> {
        Ok(self.aggregate_ids.clone())
    }
}

/// Holds no events and accepts every append.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }

    async fn aggregate_ids_by_event_type(
        &self,
        _event_type: &str,
    ) -> Result<Vec<Uuid>, DomainError> {
        Ok(vec![])
    }
}

/// Fails every call with an infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn aggregate_ids_by_event_type(
        &self,
        _event_type: &str,
    ) -> Result<Vec<Uuid>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
