//! Commands for the Channel context.

use outreach_core::command::Command;
use uuid::Uuid;

use super::aggregates::{ChannelKind, ConnectionState};

/// Command to register a new outbound channel.
#[derive(Debug, Clone)]
pub struct RegisterChannel {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Identifier assigned to the channel.
    pub channel_id: Uuid,
    /// Display name.
    pub name: String,
    /// Voice line or messaging account.
    pub kind: ChannelKind,
    /// Initial connection state.
    pub connection_state: ConnectionState,
}

impl Command for RegisterChannel {
    fn command_type(&self) -> &'static str {
        "channel.register"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.channel_id
    }
}

/// Command to record a connection state change reported by the channel.
#[derive(Debug, Clone)]
pub struct ChangeConnectionState {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The channel identifier.
    pub channel_id: Uuid,
    /// New state.
    pub connection_state: ConnectionState,
}

impl Command for ChangeConnectionState {
    fn command_type(&self) -> &'static str {
        "channel.change_connection_state"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn aggregate_id(&self) -> Uuid {
        self.channel_id
    }
}
