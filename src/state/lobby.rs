//! Lobby state management.
//!
//! A lobby is a short-lived container for players that can run one round at
//! a time. It enforces capacity and admission rules and keeps the host seat
//! filled, but performs no I/O: host changes and emptiness are reported back
//! to the caller, which owns broadcasting.

use std::fmt;

use thiserror::Error;

use crate::games::Round;
use crate::state::player::{Player, PlayerId};

/// Maximum players per lobby.
pub const MAX_LOBBY_PLAYERS: usize = 8;

/// Minimum players needed to start a round.
pub const MIN_ROUND_PLAYERS: usize = 2;

/// Lobby state.
pub struct Lobby {
    /// Shareable code, stored upper-case
    pub code: String,

    /// Members in join order
    players: Vec<Player>,

    /// Current host player ID
    pub host_id: Option<PlayerId>,

    /// Maximum players allowed
    pub max_players: usize,

    /// Game of the active round (if any)
    pub active_game_id: Option<String>,

    /// Live round object, `None` between `start_round` and install
    round: Option<Box<dyn Round>>,

    /// Incremented for every started round
    round_id: u64,

    /// When lobby was created
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of removing a member.
#[derive(Debug)]
pub struct Removal {
    pub player: Player,

    /// Promoted member, if the host left and others remain
    pub new_host: Option<PlayerId>,

    pub now_empty: bool,
}

impl Lobby {
    pub fn new(code: String) -> Self {
        Self {
            code,
            players: Vec::new(),
            host_id: None,
            max_players: MAX_LOBBY_PLAYERS,
            active_game_id: None,
            round: None,
            round_id: 0,
            created_at: chrono::Utc::now(),
        }
    }

    /// Admit a player.
    ///
    /// The first member becomes host.
    pub fn add_player(&mut self, mut player: Player) -> Result<(), LobbyError> {
        if self.is_full() {
            return Err(LobbyError::Full);
        }
        if self.has_active_round() {
            return Err(LobbyError::RoundInProgress);
        }
        if self.has_player(&player.id) {
            return Err(LobbyError::AlreadyMember);
        }

        player.lobby_code = Some(self.code.clone());
        player.is_host = self.host_id.is_none();
        if player.is_host {
            self.host_id = Some(player.id.clone());
        }

        self.players.push(player);
        Ok(())
    }

    /// Remove a member, promoting the earliest-joined survivor if the host left.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Removal> {
        let index = self.players.iter().position(|p| p.id == player_id)?;
        let mut player = self.players.remove(index);
        player.lobby_code = None;

        let mut new_host = None;
        if player.is_host {
            player.is_host = false;
            self.host_id = None;
            if let Some(next) = self.players.first_mut() {
                next.is_host = true;
                self.host_id = Some(next.id.clone());
                new_host = Some(next.id.clone());
            }
        }

        Some(Removal {
            player,
            new_host,
            now_empty: self.players.is_empty(),
        })
    }

    /// Get a member by player ID.
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    /// Get a mutable member by player ID.
    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    /// Check if player is the host.
    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_id.as_deref() == Some(player_id)
    }

    /// Members in join order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Count connected members.
    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_disconnected()).count()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn has_active_round(&self) -> bool {
        self.active_game_id.is_some()
    }

    /// Id of the most recently started round.
    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    /// Reserve the lobby for a new round of `game_id`.
    ///
    /// Returns the new round id. The round object itself is installed
    /// separately once the game has initialized.
    pub fn start_round(&mut self, game_id: &str, min_players: usize) -> Result<u64, LobbyError> {
        if self.has_active_round() {
            return Err(LobbyError::RoundInProgress);
        }
        let min = min_players.max(MIN_ROUND_PLAYERS);
        if self.players.len() < min {
            return Err(LobbyError::InsufficientPlayers { min });
        }

        self.active_game_id = Some(game_id.to_string());
        self.round = None;
        self.round_id += 1;
        Ok(self.round_id)
    }

    /// Install the initialized round object.
    pub fn install_round(&mut self, round: Box<dyn Round>) {
        self.round = Some(round);
    }

    pub fn round(&self) -> Option<&dyn Round> {
        self.round.as_deref()
    }

    /// Round object together with the roster, for driving the round.
    pub fn round_and_roster(&mut self) -> Option<(&mut dyn Round, &[Player])> {
        let round = self.round.as_deref_mut()?;
        Some((round, &self.players))
    }

    /// Clear the active round. Idempotent.
    ///
    /// Returns the previous round object so the caller can cancel its timers.
    pub fn end_round(&mut self) -> Option<Box<dyn Round>> {
        self.active_game_id = None;
        self.round.take()
    }

    /// Convert to JSON for sending to clients.
    pub fn to_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self.players.iter().map(Player::to_json).collect();

        serde_json::json!({
            "code": self.code,
            "hostId": self.host_id,
            "players": players,
            "activeGameId": self.active_game_id,
            "maxPlayers": self.max_players,
            "createdAt": self.created_at.to_rfc3339()
        })
    }
}

impl fmt::Debug for Lobby {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lobby")
            .field("code", &self.code)
            .field("players", &self.players)
            .field("host_id", &self.host_id)
            .field("active_game_id", &self.active_game_id)
            .field("round", &self.round.as_ref().map(|r| r.phase()))
            .field("round_id", &self.round_id)
            .finish()
    }
}

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("Lobby is full")]
    Full,

    #[error("A round is in progress")]
    RoundInProgress,

    #[error("At least {min} players are needed to start")]
    InsufficientPlayers { min: usize },

    #[error("Already a member of this lobby")]
    AlreadyMember,

    #[error("Not a member of this lobby")]
    NotMember,

    #[error("Lobby not found")]
    NotFound,

    #[error("No lobby codes available")]
    CodesExhausted,
}

impl LobbyError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Full => "lobby_full",
            Self::RoundInProgress => "round_in_progress",
            Self::InsufficientPlayers { .. } => "insufficient_players",
            Self::AlreadyMember => "already_member",
            Self::NotMember => "not_member",
            Self::NotFound => "lobby_not_found",
            Self::CodesExhausted => "codes_exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str) -> Player {
        Player::new(id.to_string(), format!("conn-{}", id), format!("Player {}", id))
    }

    fn lobby_with(ids: &[&str]) -> Lobby {
        let mut lobby = Lobby::new("ACDE".to_string());
        for id in ids {
            lobby.add_player(player(id)).unwrap();
        }
        lobby
    }

    #[test]
    fn test_lobby_new() {
        let lobby = Lobby::new("ACDE".to_string());
        assert!(lobby.is_empty());
        assert!(!lobby.is_full());
        assert!(lobby.host_id.is_none());
    }

    #[test]
    fn test_first_member_is_host() {
        let lobby = lobby_with(&["a", "b"]);

        assert_eq!(lobby.player_count(), 2);
        assert!(lobby.is_host("a"));
        assert!(lobby.player("a").unwrap().is_host);
        assert!(!lobby.player("b").unwrap().is_host);
        assert_eq!(lobby.player("b").unwrap().lobby_code.as_deref(), Some("ACDE"));
    }

    #[test]
    fn test_host_promotion_follows_join_order() {
        let mut lobby = lobby_with(&["a", "b", "c"]);

        let removal = lobby.remove_player("a").unwrap();
        assert_eq!(removal.new_host.as_deref(), Some("b"));
        assert!(!removal.now_empty);
        assert!(removal.player.lobby_code.is_none());
        assert!(lobby.is_host("b"));
        assert!(lobby.player("b").unwrap().is_host);
    }

    #[test]
    fn test_non_host_leave_keeps_host() {
        let mut lobby = lobby_with(&["a", "b", "c"]);

        let removal = lobby.remove_player("b").unwrap();
        assert!(removal.new_host.is_none());
        assert!(lobby.is_host("a"));
    }

    #[test]
    fn test_last_leave_empties() {
        let mut lobby = lobby_with(&["a"]);

        let removal = lobby.remove_player("a").unwrap();
        assert!(removal.now_empty);
        assert!(removal.new_host.is_none());
        assert!(lobby.host_id.is_none());
        assert!(lobby.remove_player("a").is_none());
    }

    #[test]
    fn test_lobby_full() {
        let ids: Vec<String> = (0..MAX_LOBBY_PLAYERS).map(|i| format!("p{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut lobby = lobby_with(&refs);

        assert!(lobby.is_full());
        assert_eq!(lobby.add_player(player("late")), Err(LobbyError::Full));
    }

    #[test]
    fn test_duplicate_member() {
        let mut lobby = lobby_with(&["a"]);
        assert_eq!(lobby.add_player(player("a")), Err(LobbyError::AlreadyMember));
    }

    #[test]
    fn test_round_gating() {
        let mut lobby = lobby_with(&["a"]);
        assert_eq!(
            lobby.start_round("queens", 2),
            Err(LobbyError::InsufficientPlayers { min: 2 })
        );

        lobby.add_player(player("b")).unwrap();
        assert_eq!(lobby.start_round("queens", 2), Ok(1));
        assert_eq!(lobby.active_game_id.as_deref(), Some("queens"));

        assert_eq!(lobby.start_round("poker", 2), Err(LobbyError::RoundInProgress));
        assert_eq!(lobby.add_player(player("c")), Err(LobbyError::RoundInProgress));

        assert!(lobby.end_round().is_none());
        assert!(lobby.end_round().is_none());
        assert!(!lobby.has_active_round());
        assert_eq!(lobby.start_round("poker", 2), Ok(2));
    }

    #[test]
    fn test_to_json() {
        let lobby = lobby_with(&["a", "b"]);
        let json = lobby.to_json();

        assert_eq!(json["code"], "ACDE");
        assert_eq!(json["hostId"], "a");
        assert_eq!(json["players"].as_array().unwrap().len(), 2);
        assert_eq!(json["players"][1]["id"], "b");
        assert_eq!(json["maxPlayers"], 8);
        assert!(json["activeGameId"].is_null());
    }
}
