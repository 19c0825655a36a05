//! Event handling.
//!
//! The [`Engine`] owns every piece of live state: the session directory, the
//! timer queue, the game registry and the outbox. Each handler takes
//! `&mut self` and an explicit `now`, so handlers never interleave and time
//! is fully controlled by the caller.
//!
//! ```text
//!  ClientEvent ──▶ handle ──▶ lobby_events / connection / round
//!                                    │
//!  timers due ──▶ advance ───────────┤
//!                                    ▼
//!                     SessionDirectory ─▶ Lobby ─▶ Box<dyn Round>
//!                                    │
//!                                    ▼
//!                                 Outbox ──▶ drain_outbox (transport)
//! ```
//!
//! Handlers are split by concern:
//!
//! - `lobby_events` - create, join, leave, list games
//! - `connection` - disconnect, reconnect, grace expiry, departures
//! - `round` - start, actions, end, phase timers

mod connection;
mod lobby_events;
mod round;

use std::time::Instant;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::games::GameRegistry;
use crate::protocol::{ClientEvent, Outbound, Outbox};
use crate::state::{PlayerId, Scheduler, SessionDirectory, TimerTask};

/// Single-owner session engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    directory: SessionDirectory,
    scheduler: Scheduler,
    registry: GameRegistry,
    outbox: Outbox,
    rng: ChaCha8Rng,
}

impl Engine {
    /// Engine with every built-in game registered.
    pub fn new(config: EngineConfig) -> Self {
        let registry = GameRegistry::with_defaults(&config);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: EngineConfig, registry: GameRegistry) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config,
            directory: SessionDirectory::new(),
            scheduler: Scheduler::new(),
            registry,
            outbox: Outbox::new(),
            rng,
        }
    }

    /// Handle one client event and return its acknowledgement.
    ///
    /// Rejections come back as `{error, code}`; outbound traffic is left in
    /// the outbox.
    pub fn handle(&mut self, connection_id: &str, event: ClientEvent, now: Instant) -> Value {
        let name = event.name();

        let result = match event {
            ClientEvent::CreateLobby { display_name } => {
                self.create_lobby(connection_id, &display_name)
            }
            ClientEvent::JoinLobby {
                display_name,
                lobby_code,
            } => self.join_lobby(connection_id, &display_name, &lobby_code),
            ClientEvent::LeaveLobby => self.leave_lobby(connection_id, now),
            ClientEvent::ListGames => Ok(self.list_games()),
            ClientEvent::StartRound { game_id } => self.start_round(connection_id, &game_id, now),
            ClientEvent::GameAction { action_name, data } => {
                self.game_action(connection_id, &action_name, &data, now)
            }
            ClientEvent::EndRound => self.end_round(connection_id, now),
            ClientEvent::Reconnect {
                player_id,
                lobby_code,
            } => self.reconnect(connection_id, &player_id, &lobby_code, now),
        };

        match result {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!(
                    connection = %connection_id,
                    event = name,
                    code = e.code(),
                    "Request rejected: {}",
                    e
                );
                e.to_json()
            }
        }
    }

    /// Run every timer due at `now`, in deadline order. Returns how many fired.
    pub fn advance(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some((timer_id, task)) = self.scheduler.pop_due(now) {
            fired += 1;
            match task {
                TimerTask::RemoveDisconnected {
                    lobby_code,
                    player_id,
                } => self.expire_grace(timer_id, &lobby_code, &player_id, now),
                TimerTask::Round {
                    lobby_code,
                    round_id,
                    key,
                } => self.fire_round_timer(&lobby_code, round_id, key, now),
            }
        }
        fired
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Take every queued outbound message.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        self.outbox.drain()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &GameRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh process-unique player id.
    fn new_player_id(&mut self) -> PlayerId {
        loop {
            let id = format!("{:016x}", self.rng.next_u64());
            if !self.directory.contains_player(&id) {
                return id;
            }
        }
    }

    /// Resolve a connection to `(lobby code, player id)`.
    fn member(&self, connection_id: &str) -> Result<(String, PlayerId), EngineError> {
        self.directory
            .resolve(connection_id)
            .ok_or(EngineError::NotInLobby)
    }
}
