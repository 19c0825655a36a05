//! Connection lifecycle: disconnect grace periods, reconnects and departures.
//!
//! A dropped connection does not cost a player their seat. The player is
//! marked disconnected and a removal timer is armed; reconnecting before it
//! fires cancels it. The handle stored on the player is the single source of
//! truth, so an expiry that raced a reconnect or an explicit leave finds a
//! different (or no) handle and does nothing.

use std::time::Instant;

use serde_json::{json, Value};

use super::round::close_round;
use super::Engine;
use crate::error::EngineError;
use crate::state::{Departure, Lobby, TimerId, TimerTask};

impl Engine {
    /// Transport reports a closed connection.
    pub fn disconnect(&mut self, connection_id: &str, now: Instant) {
        let Some((code, player_id)) = self.directory.resolve(connection_id) else {
            tracing::debug!(connection = %connection_id, "Disconnect from unknown connection");
            return;
        };
        self.directory.unbind_connection(connection_id);

        let grace = self.config.grace_period;
        let Some(player) = self
            .directory
            .lobby_mut(&code)
            .and_then(|lobby| lobby.player_mut(&player_id))
        else {
            return;
        };

        if let Some(previous) = player.take_pending_removal() {
            self.scheduler.cancel(previous);
        }
        let timer = self.scheduler.schedule(
            now + grace,
            TimerTask::RemoveDisconnected {
                lobby_code: code.clone(),
                player_id: player_id.clone(),
            },
        );
        player.disconnect(now, timer);
        let display_name = player.display_name.clone();

        self.outbox.broadcast(
            &code,
            "lobby:player-disconnected",
            json!({
                "playerId": player_id,
                "displayName": display_name,
                "graceMs": grace.as_millis() as u64
            }),
        );
        tracing::info!(lobby = %code, player = %player_id, "Player disconnected, seat held");
    }

    /// `reconnect`: rebind a held seat to a new connection.
    pub(crate) fn reconnect(
        &mut self,
        connection_id: &str,
        player_id: &str,
        lobby_code: &str,
        now: Instant,
    ) -> Result<Value, EngineError> {
        if let Some(bound) = self.directory.player_for(connection_id) {
            if bound != player_id {
                return Err(EngineError::AlreadyInLobby);
            }
        }

        let lobby = self
            .directory
            .lobby_mut(lobby_code)
            .ok_or(EngineError::LobbyNotFound)?;
        let code = lobby.code.clone();
        let player = lobby
            .player_mut(player_id)
            .ok_or(EngineError::PlayerNotFound)?;

        let previous_connection = player.connection_id.clone();
        let was_connected = !player.is_disconnected();
        let offline_ms = player
            .disconnected_since()
            .map(|since| now.saturating_duration_since(since).as_millis() as u64);
        if let Some(timer) = player.take_pending_removal() {
            self.scheduler.cancel(timer);
        }
        player.reconnect(connection_id.to_string());

        let display_name = player.display_name.clone();
        let player_json = player.to_json();
        let lobby_json = lobby.to_json();
        let game_state = lobby
            .round()
            .map(|round| round.reconnect_state(now, player_id))
            .unwrap_or(Value::Null);

        // Session takeover: the old connection stops routing to this player.
        if previous_connection != connection_id {
            let routed_here = self
                .directory
                .player_for(&previous_connection)
                .is_some_and(|id| id == player_id);
            if routed_here {
                self.directory.unbind_connection(&previous_connection);
                if was_connected {
                    self.outbox.leave_room(&previous_connection, &code);
                }
            }
        }

        self.directory
            .bind_connection(connection_id.to_string(), player_id.to_string());
        self.outbox.join_room(connection_id, &code);
        self.outbox.broadcast(
            &code,
            "lobby:player-reconnected",
            json!({ "playerId": player_id, "displayName": display_name }),
        );
        tracing::info!(
            lobby = %code,
            player = %player_id,
            offline_ms = ?offline_ms,
            "Player reconnected"
        );

        Ok(json!({
            "player": player_json,
            "lobby": lobby_json,
            "gameState": game_state
        }))
    }

    /// Grace timer fired.
    pub(crate) fn expire_grace(
        &mut self,
        timer_id: TimerId,
        lobby_code: &str,
        player_id: &str,
        now: Instant,
    ) {
        let Some(player) = self
            .directory
            .lobby_mut(lobby_code)
            .and_then(|lobby| lobby.player_mut(player_id))
        else {
            tracing::debug!(lobby = %lobby_code, player = %player_id, "Grace expiry for departed player");
            return;
        };

        if player.pending_removal() != Some(timer_id) {
            tracing::debug!(lobby = %lobby_code, player = %player_id, "Stale grace expiry dropped");
            return;
        }
        player.take_pending_removal();

        tracing::info!(lobby = %lobby_code, player = %player_id, "Grace period expired");
        self.depart(player_id, now);
    }

    /// Remove a player from their lobby and tell everyone who is left.
    ///
    /// Shared by explicit leaves and grace expiry.
    pub(crate) fn depart(&mut self, player_id: &str, now: Instant) -> Option<Departure> {
        let mut departure = self.directory.remove_player(player_id)?;
        let code = departure.lobby_code.clone();

        if let Some(timer) = departure.player.pending_removal() {
            self.scheduler.cancel(timer);
        }
        if !departure.player.is_disconnected() {
            self.outbox
                .leave_room(&departure.player.connection_id, &code);
        }

        match departure.destroyed.as_mut() {
            Some(lobby) => {
                close_round(lobby, &mut self.scheduler, &mut self.outbox, now);
                tracing::info!(lobby = %code, "Lobby destroyed");
            }
            None => {
                let lobby_json = self.directory.lobby(&code).map(Lobby::to_json);
                self.outbox.broadcast(
                    &code,
                    "lobby:player-left",
                    json!({ "playerId": player_id, "lobby": lobby_json }),
                );

                if let Some(host_id) = &departure.new_host {
                    self.outbox
                        .broadcast(&code, "lobby:host-changed", json!({ "hostId": host_id }));
                    tracing::info!(lobby = %code, host = %host_id, "Host migrated");
                }

                self.with_round(&code, now, |round, ctx| round.on_player_left(ctx, player_id));
            }
        }

        Some(departure)
    }
}
