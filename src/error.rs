//! Request errors reported back to clients.

use serde_json::{json, Value};
use thiserror::Error;

use crate::games::{ActionError, GameInitError};
use crate::state::{LobbyError, NameProblem};

/// Why a client request was rejected.
///
/// Every variant carries a stable machine code (see [`EngineError::code`])
/// alongside its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Display name {0}")]
    InvalidDisplayName(NameProblem),

    #[error("Lobby not found")]
    LobbyNotFound,

    #[error("Not in a lobby")]
    NotInLobby,

    #[error("Already in a lobby")]
    AlreadyInLobby,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("No round in progress")]
    NoActiveRound,

    #[error("Player not found")]
    PlayerNotFound,

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    RoundInit(#[from] GameInitError),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDisplayName(_) => "invalid_display_name",
            Self::LobbyNotFound => "lobby_not_found",
            Self::NotInLobby => "not_in_lobby",
            Self::AlreadyInLobby => "already_in_lobby",
            Self::NotHost => "not_host",
            Self::UnknownGame(_) => "unknown_game",
            Self::NoActiveRound => "no_active_round",
            Self::PlayerNotFound => "player_not_found",
            Self::Lobby(e) => e.code(),
            Self::Action(e) => e.code(),
            Self::RoundInit(e) => e.code(),
        }
    }

    /// Acknowledgement payload: `{error, code}`.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.to_string(),
            "code": self.code()
        })
    }
}

impl From<NameProblem> for EngineError {
    fn from(problem: NameProblem) -> Self {
        Self::InvalidDisplayName(problem)
    }
}
