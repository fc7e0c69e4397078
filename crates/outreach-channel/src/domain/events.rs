//! Domain events for the Channel context.

use outreach_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::{ChannelKind, ConnectionState};

/// Event type for `ChannelRegistered`.
pub const CHANNEL_REGISTERED_EVENT_TYPE: &str = "channel.registered";
/// Event type for `ConnectionChanged`.
pub const CONNECTION_CHANGED_EVENT_TYPE: &str = "channel.connection_changed";

/// Emitted when a channel is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRegistered {
    /// The channel identifier.
    pub channel_id: Uuid,
    /// Display name.
    pub name: String,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
    /// Connection state at registration.
    pub connection_state: ConnectionState,
}

/// Emitted when a channel's connection state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionChanged {
    /// The channel identifier.
    pub channel_id: Uuid,
    /// Previous state.
    pub from: ConnectionState,
    /// New state.
    pub to: ConnectionState,
}

/// Event payload variants for the Channel context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelEventKind {
    /// A channel has been registered.
    ChannelRegistered(ChannelRegistered),
    /// A channel's connection state changed.
    ConnectionChanged(ConnectionChanged),
}

/// Domain event envelope for the Channel context.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ChannelEventKind,
}

impl DomainEvent for ChannelEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            ChannelEventKind::ChannelRegistered(_) => CHANNEL_REGISTERED_EVENT_TYPE,
            ChannelEventKind::ConnectionChanged(_) => CONNECTION_CHANGED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("ChannelEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
