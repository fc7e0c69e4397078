//! In-memory implementation of the `EventRepository` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use outreach_core::error::DomainError;
use outreach_core::repository::{EventRepository, StoredEvent};

#[derive(Debug, Default)]
struct Streams {
    by_aggregate: HashMap<Uuid, Vec<StoredEvent>>,
    /// Global append order, used for `aggregate_ids_by_event_type`.
    log: Vec<(Uuid, String)>,
}

/// Process-local event store with the same optimistic concurrency semantics
/// as `PgEventRepository`. Contents are lost when the process exits; sharing
/// one instance between engines is how tests simulate a restart.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<Streams>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Streams>, DomainError> {
        self.streams
            .lock()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .lock()?
            .by_aggregate
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.lock()?;
        let stream = streams.by_aggregate.entry(aggregate_id).or_default();
        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        streams
            .log
            .extend(events.iter().map(|e| (aggregate_id, e.event_type.clone())));
        Ok(())
    }

    async fn aggregate_ids_by_event_type(
        &self,
        event_type: &str,
    ) -> Result<Vec<Uuid>, DomainError> {
        let streams = self.lock()?;
        let mut ids: Vec<Uuid> = Vec::new();
        for (aggregate_id, stored_type) in &streams.log {
            if stored_type == event_type && !ids.contains(aggregate_id) {
                ids.push(*aggregate_id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_stored_event(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_type: &str,
    ) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id,
            event_type: event_type.to_owned(),
            payload: serde_json::json!({"key": "value"}),
            sequence_number,
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_load_events_returns_empty_vec_for_unknown_aggregate() {
        // Arrange
        let repo = InMemoryEventRepository::new();

        // Act
        let events = repo.load_events(Uuid::new_v4()).await.unwrap();

        // Assert
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_load_preserves_order() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let aggregate_id = Uuid::new_v4();
        let events = vec![
            make_stored_event(aggregate_id, 1, "a"),
            make_stored_event(aggregate_id, 2, "b"),
        ];

        // Act
        repo.append_events(aggregate_id, 0, &events).await.unwrap();
        let loaded = repo.load_events(aggregate_id).await.unwrap();

        // Assert
        assert_eq!(loaded, events);
    }

    #[tokio::test]
    async fn test_append_with_stale_version_returns_conflict_and_writes_nothing() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let aggregate_id = Uuid::new_v4();
        repo.append_events(aggregate_id, 0, &[make_stored_event(aggregate_id, 1, "a")])
            .await
            .unwrap();

        // Act
        let result = repo
            .append_events(aggregate_id, 0, &[make_stored_event(aggregate_id, 1, "b")])
            .await;

        // Assert
        match result.unwrap_err() {
            DomainError::ConcurrencyConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_ids_by_event_type_lists_each_aggregate_once_in_store_order() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        repo.append_events(second, 0, &[make_stored_event(second, 1, "created")])
            .await
            .unwrap();
        repo.append_events(first, 0, &[make_stored_event(first, 1, "created")])
            .await
            .unwrap();
        repo.append_events(first, 1, &[make_stored_event(first, 2, "other")])
            .await
            .unwrap();

        // Act
        let ids = repo.aggregate_ids_by_event_type("created").await.unwrap();

        // Assert
        assert_eq!(ids, vec![second, first]);
    }
}
