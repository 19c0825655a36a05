//! Wire types.
//!
//! Inbound events arrive as `{"event": "join-lobby", "data": {...}}` and are
//! answered with a single acknowledgement value. Everything else the engine
//! says is an [`Outbound`] message collected in an [`Outbox`] and flushed by
//! the runtime after each handler returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::player::{ConnectionId, PlayerId};

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    CreateLobby {
        display_name: String,
    },
    JoinLobby {
        display_name: String,
        lobby_code: String,
    },
    LeaveLobby,
    ListGames,
    StartRound {
        game_id: String,
    },
    GameAction {
        action_name: String,
        #[serde(default)]
        data: Value,
    },
    EndRound,
    Reconnect {
        player_id: PlayerId,
        lobby_code: String,
    },
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateLobby { .. } => "create-lobby",
            Self::JoinLobby { .. } => "join-lobby",
            Self::LeaveLobby => "leave-lobby",
            Self::ListGames => "list-games",
            Self::StartRound { .. } => "start-round",
            Self::GameAction { .. } => "game-action",
            Self::EndRound => "end-round",
            Self::Reconnect { .. } => "reconnect",
        }
    }
}

/// Server → client messages handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    /// Send to every connection in a room.
    Broadcast {
        room: String,
        event: &'static str,
        payload: Value,
    },

    /// Send to one connection.
    Unicast {
        connection: ConnectionId,
        event: &'static str,
        payload: Value,
    },

    /// Subscribe a connection to a room.
    JoinRoom {
        connection: ConnectionId,
        room: String,
    },

    /// Unsubscribe a connection from a room.
    LeaveRoom {
        connection: ConnectionId,
        room: String,
    },
}

impl Outbound {
    /// Event name for broadcasts and unicasts.
    pub fn event(&self) -> Option<&'static str> {
        match self {
            Self::Broadcast { event, .. } | Self::Unicast { event, .. } => Some(*event),
            Self::JoinRoom { .. } | Self::LeaveRoom { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Broadcast { payload, .. } | Self::Unicast { payload, .. } => Some(payload),
            Self::JoinRoom { .. } | Self::LeaveRoom { .. } => None,
        }
    }
}

/// Pending outbound messages, in emission order.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Outbound>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcast(&mut self, room: &str, event: &'static str, payload: Value) {
        self.messages.push(Outbound::Broadcast {
            room: room.to_string(),
            event,
            payload,
        });
    }

    pub fn unicast(&mut self, connection: &str, event: &'static str, payload: Value) {
        self.messages.push(Outbound::Unicast {
            connection: connection.to_string(),
            event,
            payload,
        });
    }

    pub fn join_room(&mut self, connection: &str, room: &str) {
        self.messages.push(Outbound::JoinRoom {
            connection: connection.to_string(),
            room: room.to_string(),
        });
    }

    pub fn leave_room(&mut self, connection: &str, room: &str) {
        self.messages.push(Outbound::LeaveRoom {
            connection: connection.to_string(),
            room: room.to_string(),
        });
    }

    /// Take everything queued so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.messages)
    }

    pub fn messages(&self) -> &[Outbound] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
