//! Session directory.
//!
//! Routes inbound traffic: connection id → player id → lobby code → lobby.
//! Owned by the engine and passed around explicitly; there is no global
//! registry.

use std::collections::HashMap;

use rand::Rng;

use crate::state::code;
use crate::state::lobby::{Lobby, LobbyError};
use crate::state::player::{ConnectionId, Player, PlayerId};

/// Outcome of removing a player from the directory.
#[derive(Debug)]
pub struct Departure {
    pub lobby_code: String,

    pub player: Player,

    /// Promoted member, if the host left and others remain
    pub new_host: Option<PlayerId>,

    /// The lobby, if this departure emptied it; its code is already free
    pub destroyed: Option<Lobby>,
}

/// Directory of live lobbies.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    /// Lobbies by code
    lobbies: HashMap<String, Lobby>,

    /// Connection ID to player ID mapping
    connections: HashMap<ConnectionId, PlayerId>,

    /// Player ID to lobby code mapping
    players: HashMap<PlayerId, String>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lobby with `host` as its first member.
    pub fn create_lobby<R: Rng + ?Sized>(
        &mut self,
        host: Player,
        rng: &mut R,
    ) -> Result<&mut Lobby, LobbyError> {
        if self.players.contains_key(&host.id) {
            return Err(LobbyError::AlreadyMember);
        }

        let lobbies = &self.lobbies;
        let code = code::generate_with(lobbies.len(), |c| lobbies.contains_key(c), rng)
            .ok_or(LobbyError::CodesExhausted)?;

        let mut lobby = Lobby::new(code.clone());
        let player_id = host.id.clone();
        let connection_id = host.connection_id.clone();
        lobby.add_player(host)?;

        self.players.insert(player_id.clone(), code.clone());
        self.connections.insert(connection_id, player_id);
        Ok(self.lobbies.entry(code).or_insert(lobby))
    }

    /// Admit `player` to the lobby with `code`.
    pub fn join(&mut self, code: &str, player: Player) -> Result<&mut Lobby, LobbyError> {
        if self.players.contains_key(&player.id) {
            return Err(LobbyError::AlreadyMember);
        }

        let code = code::normalize(code);
        let lobby = self.lobbies.get_mut(&code).ok_or(LobbyError::NotFound)?;

        let player_id = player.id.clone();
        let connection_id = player.connection_id.clone();
        lobby.add_player(player)?;

        self.players.insert(player_id.clone(), code);
        self.connections.insert(connection_id, player_id);
        Ok(lobby)
    }

    /// Remove a player from their lobby, destroying the lobby if it empties.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Departure> {
        let code = self.players.remove(player_id)?;
        let lobby = self.lobbies.get_mut(&code)?;
        let removal = lobby.remove_player(player_id)?;

        if self.connections.get(&removal.player.connection_id).map(String::as_str) == Some(player_id) {
            self.connections.remove(&removal.player.connection_id);
        }

        let destroyed = if removal.now_empty {
            self.lobbies.remove(&code)
        } else {
            None
        };

        Some(Departure {
            lobby_code: code,
            player: removal.player,
            new_host: removal.new_host,
            destroyed,
        })
    }

    /// Route a connection to a player.
    pub fn bind_connection(&mut self, connection_id: ConnectionId, player_id: PlayerId) {
        self.connections.insert(connection_id, player_id);
    }

    /// Detach a connection. Returns the player it routed to.
    pub fn unbind_connection(&mut self, connection_id: &str) -> Option<PlayerId> {
        self.connections.remove(connection_id)
    }

    /// Player bound to a connection.
    pub fn player_for(&self, connection_id: &str) -> Option<&PlayerId> {
        self.connections.get(connection_id)
    }

    /// Resolve a connection to `(lobby code, player id)`.
    pub fn resolve(&self, connection_id: &str) -> Option<(String, PlayerId)> {
        let player_id = self.connections.get(connection_id)?;
        let code = self.players.get(player_id)?;
        Some((code.clone(), player_id.clone()))
    }

    /// Lobby code for a player.
    pub fn lobby_code_of(&self, player_id: &str) -> Option<&String> {
        self.players.get(player_id)
    }

    /// Get lobby by code (case-insensitive).
    pub fn lobby(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(&code::normalize(code))
    }

    /// Get mutable lobby by code (case-insensitive).
    pub fn lobby_mut(&mut self, code: &str) -> Option<&mut Lobby> {
        self.lobbies.get_mut(&code::normalize(code))
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.lobbies.contains_key(&code::normalize(code))
    }

    pub fn contains_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    /// Count lobbies.
    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Count bound connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get all lobby codes.
    pub fn lobby_codes(&self) -> impl Iterator<Item = &String> {
        self.lobbies.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn player(id: &str) -> Player {
        Player::new(id.to_string(), format!("conn-{}", id), format!("Player {}", id))
    }

    fn setup() -> (SessionDirectory, String) {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut directory = SessionDirectory::new();
        let code = directory.create_lobby(player("a"), &mut rng).unwrap().code.clone();
        (directory, code)
    }

    #[test]
    fn test_create_routes_host() {
        let (directory, code) = setup();

        assert_eq!(directory.lobby_count(), 1);
        assert!(directory.lobby(&code).unwrap().is_host("a"));
        assert_eq!(directory.resolve("conn-a"), Some((code, "a".to_string())));
    }

    #[test]
    fn test_join_case_insensitive() {
        let (mut directory, code) = setup();

        let lobby = directory.join(&code.to_lowercase(), player("b")).unwrap();
        assert_eq!(lobby.player_count(), 2);
        assert!(directory.lobby(&code.to_lowercase()).is_some());
        assert_eq!(directory.resolve("conn-b").unwrap().1, "b");
    }

    #[test]
    fn test_join_unknown_and_duplicate() {
        let (mut directory, code) = setup();

        assert_eq!(
            directory.join("ZZZZ", player("b")).unwrap_err(),
            LobbyError::NotFound
        );
        assert_eq!(
            directory.join(&code, player("a")).unwrap_err(),
            LobbyError::AlreadyMember
        );
    }

    #[test]
    fn test_host_departure_promotes() {
        let (mut directory, code) = setup();
        directory.join(&code, player("b")).unwrap();
        directory.join(&code, player("c")).unwrap();

        let departure = directory.remove_player("a").unwrap();
        assert_eq!(departure.new_host.as_deref(), Some("b"));
        assert!(departure.destroyed.is_none());
        assert!(directory.resolve("conn-a").is_none());
        assert!(directory.lobby(&code).unwrap().is_host("b"));
    }

    #[test]
    fn test_last_departure_frees_code() {
        let (mut directory, code) = setup();

        let departure = directory.remove_player("a").unwrap();
        assert_eq!(departure.destroyed.unwrap().code, code);
        assert!(!directory.contains_code(&code));
        assert_eq!(directory.lobby_count(), 0);
        assert_eq!(directory.connection_count(), 0);
        assert!(directory.remove_player("a").is_none());
    }

    #[test]
    fn test_rebound_connection_survives_removal() {
        let (mut directory, code) = setup();
        directory.join(&code, player("b")).unwrap();

        // b's old connection id was reused by a new client
        directory.unbind_connection("conn-b");
        directory.bind_connection("conn-b".to_string(), "x".to_string());

        directory.remove_player("b").unwrap();
        assert_eq!(directory.player_for("conn-b").map(String::as_str), Some("x"));
    }
}
