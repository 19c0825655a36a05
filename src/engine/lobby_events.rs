//! Lobby membership requests.

use std::time::Instant;

use serde_json::{json, Value};

use super::Engine;
use crate::error::EngineError;
use crate::state::{validate_display_name, Player};

impl Engine {
    /// `create-lobby`: new lobby with the caller as host.
    pub(crate) fn create_lobby(
        &mut self,
        connection_id: &str,
        display_name: &str,
    ) -> Result<Value, EngineError> {
        let display_name = validate_display_name(display_name)?;
        if self.directory.player_for(connection_id).is_some() {
            return Err(EngineError::AlreadyInLobby);
        }

        let player_id = self.new_player_id();
        let host = Player::new(player_id.clone(), connection_id.to_string(), display_name);

        let lobby = self.directory.create_lobby(host, &mut self.rng)?;
        lobby.max_players = self.config.max_players;

        let code = lobby.code.clone();
        let player = lobby.player(&player_id).map(Player::to_json);
        let lobby_json = lobby.to_json();

        self.outbox.join_room(connection_id, &code);
        tracing::info!(lobby = %code, player = %player_id, "Lobby created");

        Ok(json!({
            "lobbyCode": code,
            "player": player,
            "lobby": lobby_json
        }))
    }

    /// `join-lobby`: admit the caller to an existing lobby.
    pub(crate) fn join_lobby(
        &mut self,
        connection_id: &str,
        display_name: &str,
        lobby_code: &str,
    ) -> Result<Value, EngineError> {
        let display_name = validate_display_name(display_name)?;
        if self.directory.player_for(connection_id).is_some() {
            return Err(EngineError::AlreadyInLobby);
        }
        if !self.directory.contains_code(lobby_code) {
            return Err(EngineError::LobbyNotFound);
        }

        let player_id = self.new_player_id();
        let player = Player::new(player_id.clone(), connection_id.to_string(), display_name);

        let lobby = self.directory.join(lobby_code, player)?;
        let code = lobby.code.clone();
        let player = lobby.player(&player_id).map(Player::to_json);
        let lobby_json = lobby.to_json();

        self.outbox.join_room(connection_id, &code);
        self.outbox.broadcast(
            &code,
            "lobby:player-joined",
            json!({ "player": player, "lobby": lobby_json }),
        );
        tracing::info!(lobby = %code, player = %player_id, "Player joined");

        Ok(json!({ "player": player, "lobby": lobby_json }))
    }

    /// `leave-lobby`: explicit departure.
    pub(crate) fn leave_lobby(
        &mut self,
        connection_id: &str,
        now: Instant,
    ) -> Result<Value, EngineError> {
        let (code, player_id) = self.member(connection_id)?;
        tracing::info!(lobby = %code, player = %player_id, "Player leaving");

        self.depart(&player_id, now);
        Ok(json!({ "success": true }))
    }

    /// `list-games`
    pub(crate) fn list_games(&self) -> Value {
        json!({ "games": self.registry.list() })
    }
}
