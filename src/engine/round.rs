//! Round requests and phase timers.

use std::time::Instant;

use serde_json::{json, Value};

use super::Engine;
use crate::error::EngineError;
use crate::games::{GameInitError, Participant, Round, RoundContext};
use crate::protocol::Outbox;
use crate::state::{Lobby, Scheduler};

impl Engine {
    /// `start-round`: host picks a game; it is dealt and started at once.
    ///
    /// A failed init releases the lobby again, so nothing is left half-started.
    pub(crate) fn start_round(
        &mut self,
        connection_id: &str,
        game_id: &str,
        now: Instant,
    ) -> Result<Value, EngineError> {
        let (code, player_id) = self.member(connection_id)?;
        let game = self
            .registry
            .get(game_id)
            .ok_or_else(|| EngineError::UnknownGame(game_id.to_string()))?;
        let lobby = self
            .directory
            .lobby_mut(&code)
            .ok_or(EngineError::LobbyNotFound)?;
        if !lobby.is_host(&player_id) {
            return Err(EngineError::NotHost);
        }

        let min_players = game.min_players().max(self.config.min_players);
        let round_id = lobby.start_round(game.id(), min_players)?;
        let participants: Vec<Participant> =
            lobby.players().iter().map(Participant::from).collect();

        let round = match game.init(&participants, &mut self.rng) {
            Ok(round) => round,
            Err(e) => {
                lobby.end_round();
                if let GameInitError::PuzzleGeneration(_) = e {
                    tracing::error!(lobby = %code, game = game.id(), "Round init failed: {}", e);
                }
                return Err(e.into());
            }
        };
        lobby.install_round(round);

        let game_json = game.to_json();
        self.outbox.broadcast(
            &code,
            "round:started",
            json!({
                "gameId": game_id,
                "roundId": round_id,
                "game": game_json,
                "participants": participants.iter().map(|p| &p.id).collect::<Vec<_>>()
            }),
        );
        tracing::info!(lobby = %code, game = %game_id, round = round_id, "Round started");

        self.with_round(&code, now, |round, ctx| round.start(ctx));
        Ok(json!({ "success": true }))
    }

    /// `game-action`: forward to the active round.
    pub(crate) fn game_action(
        &mut self,
        connection_id: &str,
        action: &str,
        data: &Value,
        now: Instant,
    ) -> Result<Value, EngineError> {
        let (code, player_id) = self.member(connection_id)?;

        let result = self
            .with_round(&code, now, |round, ctx| {
                round.handle_action(ctx, &player_id, action, data)
            })
            .ok_or(EngineError::NoActiveRound)?;
        Ok(result?)
    }

    /// `end-round`: host ends the round, finished or not.
    pub(crate) fn end_round(
        &mut self,
        connection_id: &str,
        now: Instant,
    ) -> Result<Value, EngineError> {
        let (code, player_id) = self.member(connection_id)?;
        let lobby = self
            .directory
            .lobby_mut(&code)
            .ok_or(EngineError::LobbyNotFound)?;
        if !lobby.is_host(&player_id) {
            return Err(EngineError::NotHost);
        }
        let Some(game_id) = lobby.active_game_id.clone() else {
            return Err(EngineError::NoActiveRound);
        };

        close_round(lobby, &mut self.scheduler, &mut self.outbox, now);
        self.outbox
            .broadcast(&code, "round:ended", json!({ "gameId": game_id }));
        Ok(json!({ "success": true }))
    }

    /// A round's phase timer came due.
    ///
    /// Firings for a lobby that is gone or has moved on to another round are
    /// dropped.
    pub(crate) fn fire_round_timer(
        &mut self,
        lobby_code: &str,
        round_id: u64,
        key: &'static str,
        now: Instant,
    ) {
        let live = self
            .directory
            .lobby(lobby_code)
            .is_some_and(|lobby| lobby.round_id() == round_id && lobby.round().is_some());
        if !live {
            tracing::debug!(lobby = %lobby_code, round = round_id, key, "Stale round timer dropped");
            return;
        }

        self.with_round(lobby_code, now, |round, ctx| round.on_timer(ctx, key));
    }

    /// Run `f` against the lobby's installed round.
    pub(crate) fn with_round<T>(
        &mut self,
        lobby_code: &str,
        now: Instant,
        f: impl FnOnce(&mut dyn Round, &mut RoundContext<'_>) -> T,
    ) -> Option<T> {
        let lobby = self.directory.lobby_mut(lobby_code)?;
        let code = lobby.code.clone();
        let round_id = lobby.round_id();
        let (round, roster) = lobby.round_and_roster()?;

        let was_finished = round.is_finished();
        let mut ctx = RoundContext::new(
            now,
            &code,
            round_id,
            roster,
            &mut self.scheduler,
            &mut self.outbox,
        );
        let out = f(&mut *round, &mut ctx);

        if !was_finished && round.is_finished() {
            tracing::info!(lobby = %code, game = round.game_id(), round = round_id, "Round finished");
        }
        Some(out)
    }
}

/// End whatever round `lobby` still holds, cancelling its timers.
pub(crate) fn close_round(
    lobby: &mut Lobby,
    scheduler: &mut Scheduler,
    outbox: &mut Outbox,
    now: Instant,
) -> bool {
    let round_id = lobby.round_id();
    let Some(mut round) = lobby.end_round() else {
        return false;
    };

    let mut ctx = RoundContext::new(now, &lobby.code, round_id, lobby.players(), scheduler, outbox);
    round.end(&mut ctx);
    tracing::info!(lobby = %lobby.code, game = round.game_id(), round = round_id, "Round ended");
    true
}
