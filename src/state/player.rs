//! Lobby participants.
//!
//! A player keeps the same id for as long as they hold a seat in a lobby.
//! The connection id changes every time the transport reconnects them.
//!
//! # Presence
//!
//! ```text
//!   join/create          disconnect             grace expires
//! ─────────────▶ Connected ─────────▶ Disconnected ─────────────▶ removed
//!                    ▲                     │
//!                    └─────────────────────┘
//!                          reconnect
//! ```

use std::fmt;
use std::time::Instant;

use crate::state::timer::TimerId;

/// Stable player identifier.
pub type PlayerId = String;

/// Transport connection identifier.
pub type ConnectionId = String;

/// Display name length bounds (inclusive).
pub const MIN_DISPLAY_NAME: usize = 3;
pub const MAX_DISPLAY_NAME: usize = 20;

/// Whether the player currently has a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Presence {
    #[default]
    Connected,

    /// Seat held for reconnection until the removal timer fires.
    Disconnected {
        since: Instant,
        removal: Option<TimerId>,
    },
}

/// A participant in a lobby.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,

    /// Current (or last known) transport connection
    pub connection_id: ConnectionId,

    pub display_name: String,

    pub is_host: bool,

    /// Back-reference to the lobby, `None` until admitted
    pub lobby_code: Option<String>,

    pub presence: Presence,

    /// When this player was created
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl Player {
    pub fn new(id: PlayerId, connection_id: ConnectionId, display_name: String) -> Self {
        Self {
            id,
            connection_id,
            display_name,
            is_host: false,
            lobby_code: None,
            presence: Presence::Connected,
            joined_at: chrono::Utc::now(),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self.presence, Presence::Disconnected { .. })
    }

    /// Handle of the scheduled removal, if one is pending.
    pub fn pending_removal(&self) -> Option<TimerId> {
        match self.presence {
            Presence::Disconnected { removal, .. } => removal,
            Presence::Connected => None,
        }
    }

    /// When the seat went offline, `None` while connected.
    pub fn disconnected_since(&self) -> Option<Instant> {
        match self.presence {
            Presence::Disconnected { since, .. } => Some(since),
            Presence::Connected => None,
        }
    }

    /// Mark as disconnected with a scheduled removal.
    pub fn disconnect(&mut self, now: Instant, removal: TimerId) {
        self.presence = Presence::Disconnected {
            since: now,
            removal: Some(removal),
        };
    }

    /// Clear and return the pending removal handle.
    ///
    /// The seat stays marked as disconnected; only the timer reference is
    /// dropped, so a second caller sees `None`.
    pub fn take_pending_removal(&mut self) -> Option<TimerId> {
        match &mut self.presence {
            Presence::Disconnected { removal, .. } => removal.take(),
            Presence::Connected => None,
        }
    }

    /// Rebind to a new connection.
    pub fn reconnect(&mut self, connection_id: ConnectionId) {
        self.connection_id = connection_id;
        self.presence = Presence::Connected;
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "displayName": self.display_name,
            "isHost": self.is_host,
            "lobbyCode": self.lobby_code,
            "disconnected": self.is_disconnected()
        })
    }
}

/// Why a display name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameProblem {
    TooShort,
    TooLong,
    BadCharacter(char),
}

impl fmt::Display for NameProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "must be at least {} characters", MIN_DISPLAY_NAME),
            Self::TooLong => write!(f, "must be at most {} characters", MAX_DISPLAY_NAME),
            Self::BadCharacter(c) => write!(f, "contains unsupported character '{}'", c),
        }
    }
}

/// Validate and trim a display name.
pub fn validate_display_name(raw: &str) -> Result<String, NameProblem> {
    let name = raw.trim();
    let len = name.chars().count();

    if len < MIN_DISPLAY_NAME {
        return Err(NameProblem::TooShort);
    }
    if len > MAX_DISPLAY_NAME {
        return Err(NameProblem::TooLong);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-')))
    {
        return Err(NameProblem::BadCharacter(c));
    }

    Ok(name.to_string())
}
