//! Aggregate roots for the Channel context.

use std::fmt;

use outreach_core::aggregate::AggregateRoot;
use outreach_core::clock::Clock;
use outreach_core::error::DomainError;
use outreach_core::event::EventMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    CHANNEL_REGISTERED_EVENT_TYPE, CONNECTION_CHANGED_EVENT_TYPE, ChannelEvent, ChannelEventKind,
    ChannelRegistered, ConnectionChanged,
};

/// What a channel delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Outbound phone line driven by a voice assistant.
    Voice,
    /// Messaging account (WhatsApp sender).
    Messaging,
}

/// Connection state reported by the channel provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Ready to dispatch.
    Connected,
    /// Not usable.
    Disconnected,
    /// Reachable but unhealthy; still selectable.
    Degraded,
}

impl ConnectionState {
    /// Returns `true` when the channel may be picked for a dispatch.
    #[must_use]
    pub fn is_selectable(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Degraded => "degraded",
        })
    }
}

/// The aggregate root for an outbound channel.
#[derive(Debug)]
pub struct Channel {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub(crate) version: i64,
    /// Display name.
    pub name: String,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
    /// Current connection state.
    pub connection_state: ConnectionState,
    registered: bool,
    uncommitted_events: Vec<ChannelEvent>,
}

impl Channel {
    /// Creates an empty channel aggregate.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            name: String::new(),
            kind: ChannelKind::Messaging,
            connection_state: ConnectionState::Disconnected,
            registered: false,
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns `true` once the registration event has been applied.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    #[allow(clippy::cast_possible_wrap)]
    fn next_sequence_number(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    fn raise(
        &mut self,
        kind: ChannelEventKind,
        event_type: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) {
        let metadata = EventMetadata::new(
            event_type,
            self.id,
            self.next_sequence_number(),
            correlation_id,
            clock.now(),
        );
        self.uncommitted_events.push(ChannelEvent { metadata, kind });
    }

    /// Registers the channel.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is blank or the channel
    /// is already registered.
    pub fn register(
        &mut self,
        name: &str,
        kind: ChannelKind,
        connection_state: ConnectionState,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.registered || !self.uncommitted_events.is_empty() {
            return Err(DomainError::Validation(format!(
                "channel {} is already registered",
                self.id
            )));
        }
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "channel name must not be empty".into(),
            ));
        }
        self.raise(
            ChannelEventKind::ChannelRegistered(ChannelRegistered {
                channel_id: self.id,
                name: name.to_owned(),
                kind,
                connection_state,
            }),
            CHANNEL_REGISTERED_EVENT_TYPE,
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Changes the connection state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unregistered channel,
    /// `DomainError::Validation` if the state does not change.
    pub fn change_connection_state(
        &mut self,
        connection_state: ConnectionState,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.registered {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        if self.connection_state == connection_state {
            return Err(DomainError::Validation(format!(
                "channel {} is already {connection_state}",
                self.id
            )));
        }
        self.raise(
            ChannelEventKind::ConnectionChanged(ConnectionChanged {
                channel_id: self.id,
                from: self.connection_state,
                to: connection_state,
            }),
            CONNECTION_CHANGED_EVENT_TYPE,
            correlation_id,
            clock,
        );
        Ok(())
    }
}

impl AggregateRoot for Channel {
    type Event = ChannelEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        match &event.kind {
            ChannelEventKind::ChannelRegistered(payload) => {
                self.name.clone_from(&payload.name);
                self.kind = payload.kind;
                self.connection_state = payload.connection_state;
                self.registered = true;
            }
            ChannelEventKind::ConnectionChanged(payload) => {
                self.connection_state = payload.to;
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use outreach_core::event::DomainEvent;
    use outreach_test_support::FixedClock;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_register_produces_registered_event() {
        let mut channel = Channel::new(Uuid::new_v4());

        channel
            .register(
                "Sales line 1",
                ChannelKind::Voice,
                ConnectionState::Connected,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();

        assert_eq!(
            channel.uncommitted_events()[0].event_type(),
            "channel.registered"
        );
        channel.commit();
        assert!(channel.is_registered());
        assert_eq!(channel.name, "Sales line 1");
        assert_eq!(channel.kind, ChannelKind::Voice);
        assert_eq!(channel.version(), 1);
    }

    #[test]
    fn test_register_rejects_blank_name_and_double_registration() {
        let mut channel = Channel::new(Uuid::new_v4());
        assert!(
            channel
                .register(
                    " ",
                    ChannelKind::Messaging,
                    ConnectionState::Connected,
                    Uuid::new_v4(),
                    &clock(),
                )
                .is_err()
        );

        channel
            .register(
                "wa-01",
                ChannelKind::Messaging,
                ConnectionState::Connected,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();
        channel.commit();

        assert!(
            channel
                .register(
                    "wa-01",
                    ChannelKind::Messaging,
                    ConnectionState::Connected,
                    Uuid::new_v4(),
                    &clock(),
                )
                .is_err()
        );
    }

    #[test]
    fn test_change_connection_state_records_transition() {
        let mut channel = Channel::new(Uuid::new_v4());
        channel
            .register(
                "wa-02",
                ChannelKind::Messaging,
                ConnectionState::Connected,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();
        channel.commit();

        channel
            .change_connection_state(ConnectionState::Disconnected, Uuid::new_v4(), &clock())
            .unwrap();
        channel.commit();

        assert_eq!(channel.connection_state, ConnectionState::Disconnected);
        assert!(!channel.connection_state.is_selectable());
        assert!(ConnectionState::Degraded.is_selectable());
    }

    #[test]
    fn test_change_connection_state_rejects_noop() {
        let mut channel = Channel::new(Uuid::new_v4());
        channel
            .register(
                "wa-03",
                ChannelKind::Messaging,
                ConnectionState::Degraded,
                Uuid::new_v4(),
                &clock(),
            )
            .unwrap();
        channel.commit();

        let result =
            channel.change_connection_state(ConnectionState::Degraded, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_change_connection_state_on_unregistered_channel_is_not_found() {
        let mut channel = Channel::new(Uuid::new_v4());

        let result =
            channel.change_connection_state(ConnectionState::Connected, Uuid::new_v4(), &clock());

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }
}
