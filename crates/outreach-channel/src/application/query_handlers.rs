//! Query handlers for the Channel context.

use outreach_core::error::DomainError;
use outreach_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::load_channel;
use crate::domain::aggregates::{Channel, ChannelKind, ConnectionState};
use crate::domain::events::CHANNEL_REGISTERED_EVENT_TYPE;

/// Read-only view of a channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelView {
    /// The channel identifier.
    pub channel_id: Uuid,
    /// Display name.
    pub name: String,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
    /// Current connection state.
    pub connection_state: ConnectionState,
    /// Current version (event count).
    pub version: i64,
}

impl From<&Channel> for ChannelView {
    fn from(channel: &Channel) -> Self {
        Self {
            channel_id: channel.id,
            name: channel.name.clone(),
            kind: channel.kind,
            connection_state: channel.connection_state,
            version: channel.version,
        }
    }
}

/// Retrieves a channel by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
pub async fn get_channel_by_id(
    channel_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<ChannelView, DomainError> {
    let channel = load_channel(channel_id, repo).await?;
    Ok(ChannelView::from(&channel))
}

/// Lists every registered channel in registration order.
///
/// # Errors
///
/// Returns any repository or deserialization error.
pub async fn list_channels(repo: &dyn EventRepository) -> Result<Vec<ChannelView>, DomainError> {
    let ids = repo
        .aggregate_ids_by_event_type(CHANNEL_REGISTERED_EVENT_TYPE)
        .await?;
    let mut views = Vec::with_capacity(ids.len());
    for channel_id in ids {
        let channel = load_channel(channel_id, repo).await?;
        views.push(ChannelView::from(&channel));
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use outreach_core::aggregate::AggregateRoot;
    use outreach_core::event::DomainEvent;
    use outreach_core::repository::StoredEvent;

    use super::*;
    use outreach_test_support::{FixedClock, RecordingEventRepository};

    #[tokio::test]
    async fn test_list_channels_returns_registered_channels() {
        // Arrange
        let channel_id = Uuid::new_v4();
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        let mut channel = Channel::new(channel_id);
        channel
            .register(
                "wa-sales",
                ChannelKind::Messaging,
                ConnectionState::Degraded,
                Uuid::new_v4(),
                &clock,
            )
            .unwrap();
        let events: Vec<StoredEvent> = channel
            .uncommitted_events()
            .iter()
            .map(DomainEvent::to_stored)
            .collect();
        let repo = RecordingEventRepository::new(Ok(events)).with_aggregate_ids(vec![channel_id]);

        // Act
        let views = list_channels(&repo).await.unwrap();

        // Assert
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].channel_id, channel_id);
        assert_eq!(views[0].name, "wa-sales");
        assert_eq!(views[0].connection_state, ConnectionState::Degraded);
        assert_eq!(views[0].version, 1);
    }
}
