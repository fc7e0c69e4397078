//! Command handlers for the Channel context.

use outreach_core::aggregate::AggregateRoot;
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use outreach_core::event::{DomainEvent, EventMetadata};
use outreach_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

use crate::domain::aggregates::Channel;
use crate::domain::commands::{ChangeConnectionState, RegisterChannel};
use crate::domain::events::{ChannelEvent, ChannelEventKind};

/// Reconstitutes a `Channel` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub fn reconstitute(
    channel_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Channel, DomainError> {
    let mut channel = Channel::new(channel_id);
    for stored in existing_events {
        let kind: ChannelEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        channel.apply(&ChannelEvent {
            metadata: EventMetadata::from_stored(stored),
            kind,
        });
    }
    Ok(channel)
}

/// Loads a registered channel.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the stream is empty.
pub async fn load_channel(
    channel_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<Channel, DomainError> {
    let existing_events = repo.load_events(channel_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(channel_id));
    }
    reconstitute(channel_id, &existing_events)
}

async fn save_channel(
    channel: &mut Channel,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let stored_events: Vec<StoredEvent> = channel
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored)
        .collect();
    repo.append_events(channel.id, channel.version, &stored_events)
        .await?;
    channel.commit();
    Ok(stored_events)
}

/// Handles the `RegisterChannel` command. Returns the registered channel and
/// the appended events.
///
/// # Errors
///
/// Returns `DomainError::Validation` for blank names or duplicate ids, or a
/// repository error.
pub async fn handle_register_channel(
    command: &RegisterChannel,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<(Channel, Vec<StoredEvent>), DomainError> {
    let existing_events = repo.load_events(command.channel_id).await?;
    let mut channel = reconstitute(command.channel_id, &existing_events)?;

    channel.register(
        &command.name,
        command.kind,
        command.connection_state,
        command.correlation_id,
        clock,
    )?;

    let stored_events = save_channel(&mut channel, repo).await?;
    Ok((channel, stored_events))
}

/// Handles the `ChangeConnectionState` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for unknown channels,
/// `DomainError::Validation` when the state is unchanged, or a repository
/// error.
pub async fn handle_change_connection_state(
    command: &ChangeConnectionState,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<(Channel, Vec<StoredEvent>), DomainError> {
    let mut channel = load_channel(command.channel_id, repo).await?;

    channel.change_connection_state(command.connection_state, command.correlation_id, clock)?;

    let stored_events = save_channel(&mut channel, repo).await?;
    Ok((channel, stored_events))
}
