//! Game rule modules and the round contract.
//!
//! A [`Game`] is a registry entry that knows how to deal a fresh [`Round`].
//! The round object owns all per-round state and drives its own phases: it
//! arms timers through the [`RoundContext`], reacts to player actions and
//! timer firings, and eventually enters its terminal `results` phase.
//!
//! # Phase discipline
//!
//! - every phase timer lives in the round's [`PhaseTimers`]
//! - leaving a phase early cancels its timer before transitioning
//! - `finish` is guarded by the phase, so a timeout racing the last action
//!   produces exactly one `round:results`
//!
//! ```text
//!  init ──▶ start ──▶ phase 1 ──▶ … ──▶ results
//!                       │  ▲               ▲
//!              action / │  │ timer         │ finish (idempotent)
//!                       ▼  │               │
//!                     handle_action ───────┘
//! ```

pub mod poker;
pub mod queens;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngCore;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::protocol::Outbox;
use crate::state::player::{Player, PlayerId};
use crate::state::timer::{Scheduler, TimerId, TimerTask};

/// Name of the terminal phase shared by every game.
pub const RESULTS_PHASE: &str = "results";

/// A participant as the round sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: PlayerId,
    pub display_name: String,
}

impl From<&Player> for Participant {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            display_name: player.display_name.clone(),
        }
    }
}

/// Registry entry for a playable game.
pub trait Game: Send {
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn min_players(&self) -> usize;

    /// Set up a new round for `participants`. Nothing is broadcast until
    /// [`Round::start`].
    fn init(
        &self,
        participants: &[Participant],
        rng: &mut dyn RngCore,
    ) -> Result<Box<dyn Round>, GameInitError>;

    fn to_json(&self) -> Value {
        json!({
            "id": self.id(),
            "name": self.name(),
            "description": self.description(),
            "minPlayers": self.min_players()
        })
    }
}

/// A live round.
pub trait Round: Send {
    fn game_id(&self) -> &'static str;

    /// Current phase name.
    fn phase(&self) -> &'static str;

    fn is_finished(&self) -> bool {
        self.phase() == RESULTS_PHASE
    }

    /// Enter the first phase.
    fn start(&mut self, ctx: &mut RoundContext<'_>);

    fn handle_action(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player_id: &str,
        action: &str,
        data: &Value,
    ) -> Result<Value, ActionError>;

    /// A phase timer named `key` came due.
    fn on_timer(&mut self, ctx: &mut RoundContext<'_>, key: &'static str);

    /// A participant left the lobby mid-round.
    fn on_player_left(&mut self, ctx: &mut RoundContext<'_>, player_id: &str);

    /// Enter `results`. Returns false if the round had already finished.
    fn finish(&mut self, ctx: &mut RoundContext<'_>) -> bool;

    /// State a returning player needs to resume.
    fn reconnect_state(&self, now: Instant, player_id: &str) -> Value;

    /// Explicit termination: cancel every outstanding timer.
    fn end(&mut self, ctx: &mut RoundContext<'_>);
}

/// Named timer handles owned by one round.
#[derive(Debug, Default)]
pub struct PhaseTimers {
    handles: HashMap<&'static str, TimerId>,
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    /// Drop the handle of a timer that has fired.
    pub fn forget(&mut self, key: &str) -> Option<TimerId> {
        self.handles.remove(key)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// What a round may touch while handling one event.
pub struct RoundContext<'a> {
    pub now: Instant,
    pub lobby_code: &'a str,
    pub round_id: u64,
    roster: &'a [Player],
    scheduler: &'a mut Scheduler,
    outbox: &'a mut Outbox,
}

impl<'a> RoundContext<'a> {
    pub fn new(
        now: Instant,
        lobby_code: &'a str,
        round_id: u64,
        roster: &'a [Player],
        scheduler: &'a mut Scheduler,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            now,
            lobby_code,
            round_id,
            roster,
            scheduler,
            outbox,
        }
    }

    /// Current lobby members.
    pub fn roster(&self) -> &[Player] {
        self.roster
    }

    /// Send to the whole lobby.
    pub fn broadcast(&mut self, event: &'static str, payload: Value) {
        self.outbox.broadcast(self.lobby_code, event, payload);
    }

    /// Send to one member. Returns false if they are absent or disconnected.
    pub fn send_to(&mut self, player_id: &str, event: &'static str, payload: Value) -> bool {
        match self.roster.iter().find(|p| p.id == player_id) {
            Some(player) if !player.is_disconnected() => {
                self.outbox.unicast(&player.connection_id, event, payload);
                true
            }
            _ => false,
        }
    }

    /// Arm `key` to fire after `delay`, replacing any pending timer with that key.
    pub fn schedule(&mut self, timers: &mut PhaseTimers, key: &'static str, delay: Duration) {
        let task = TimerTask::Round {
            lobby_code: self.lobby_code.to_string(),
            round_id: self.round_id,
            key,
        };
        let id = self.scheduler.schedule(self.now + delay, task);
        if let Some(previous) = timers.handles.insert(key, id) {
            self.scheduler.cancel(previous);
        }
    }

    /// Cancel one timer. Returns false if it was not pending.
    pub fn cancel(&mut self, timers: &mut PhaseTimers, key: &str) -> bool {
        match timers.handles.remove(key) {
            Some(id) => self.scheduler.cancel(id),
            None => false,
        }
    }

    /// Cancel every timer the round holds.
    pub fn cancel_all(&mut self, timers: &mut PhaseTimers) {
        for (_, id) in timers.handles.drain() {
            self.scheduler.cancel(id);
        }
    }
}

/// An entry with its competition rank (ties share a rank, next rank skips).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked<T> {
    pub rank: usize,
    pub entry: T,
}

/// Rank entries best-first by ascending `key`.
pub fn rank_by<T, K, F>(mut entries: Vec<T>, key: F) -> Vec<Ranked<T>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    entries.sort_by(|a, b| key(a).cmp(&key(b)));

    let mut ranked: Vec<Ranked<T>> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let rank = match ranked.last() {
            Some(prev) if key(&prev.entry) == key(&entry) => prev.rank,
            _ => i + 1,
        };
        ranked.push(Ranked { rank, entry });
    }
    ranked
}

/// Everyone tied at the worst rank; empty when all share first place.
pub fn losers<T>(ranked: &[Ranked<T>]) -> Vec<&T> {
    let worst = match ranked.iter().map(|r| r.rank).max() {
        Some(rank) if rank > 1 => rank,
        _ => return Vec::new(),
    };
    ranked
        .iter()
        .filter(|r| r.rank == worst)
        .map(|r| &r.entry)
        .collect()
}

/// Game registry.
#[derive(Default)]
pub struct GameRegistry {
    /// Games in registration order
    games: Vec<Box<dyn Game>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in game.
    pub fn with_defaults(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(queens::QueensGame::new(config.queens.clone())));
        registry.register(Box::new(poker::PokerGame::new(config.poker.clone())));
        registry
    }

    /// Add a game, replacing any game with the same id.
    pub fn register(&mut self, game: Box<dyn Game>) {
        self.games.retain(|g| g.id() != game.id());
        self.games.push(game);
    }

    pub fn get(&self, game_id: &str) -> Option<&dyn Game> {
        self.games
            .iter()
            .find(|g| g.id() == game_id)
            .map(|g| g.as_ref())
    }

    pub fn list(&self) -> Vec<Value> {
        self.games.iter().map(|g| g.to_json()).collect()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl std::fmt::Debug for GameRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.games.iter().map(|g| g.id()))
            .finish()
    }
}

/// Rejected game action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Action not allowed during the {0} phase")]
    WrongPhase(&'static str),

    #[error("The round has finished")]
    RoundFinished,

    #[error("Not a participant in this round")]
    NotParticipant,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongPhase(_) => "wrong_phase",
            Self::RoundFinished => "round_finished",
            Self::NotParticipant => "not_participant",
            Self::UnknownAction(_) => "unknown_action",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }
}

/// Round setup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameInitError {
    #[error("Puzzle generation failed: {0}")]
    PuzzleGeneration(#[from] queens::GenerationError),

    #[error("Need at least {min} players, have {found}")]
    NotEnoughPlayers { min: usize, found: usize },

    #[error("At most {max} players can take part, have {found}")]
    TooManyPlayers { max: usize, found: usize },
}

impl GameInitError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PuzzleGeneration(_) => "puzzle_generation_failed",
            Self::NotEnoughPlayers { .. } => "insufficient_players",
            Self::TooManyPlayers { .. } => "too_many_players",
        }
    }
}

/// Milliseconds left until `deadline`, zero once passed.
pub(crate) fn remaining_ms(now: Instant, deadline: Instant) -> u64 {
    deadline.saturating_duration_since(now).as_millis() as u64
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures for driving a round without an engine.

    use super::*;

    pub struct Harness {
        pub now: Instant,
        pub roster: Vec<Player>,
        pub scheduler: Scheduler,
        pub outbox: Outbox,
    }

    impl Harness {
        pub fn new(names: &[&str]) -> Self {
            let roster = names
                .iter()
                .map(|n| Player::new(n.to_string(), format!("conn-{}", n), n.to_string()))
                .collect();
            Self {
                now: Instant::now(),
                roster,
                scheduler: Scheduler::new(),
                outbox: Outbox::new(),
            }
        }

        pub fn participants(&self) -> Vec<Participant> {
            self.roster.iter().map(Participant::from).collect()
        }

        pub fn ctx(&mut self) -> RoundContext<'_> {
            RoundContext::new(
                self.now,
                "ACDE",
                1,
                &self.roster,
                &mut self.scheduler,
                &mut self.outbox,
            )
        }

        /// Move the clock and fire every due round timer.
        pub fn advance(&mut self, by: Duration, round: &mut dyn Round) {
            self.now += by;
            while let Some((_, task)) = self.scheduler.pop_due(self.now) {
                if let TimerTask::Round { key, .. } = task {
                    let mut ctx = RoundContext::new(
                        self.now,
                        "ACDE",
                        1,
                        &self.roster,
                        &mut self.scheduler,
                        &mut self.outbox,
                    );
                    round.on_timer(&mut ctx, key);
                }
            }
        }

        /// Count emitted messages with `event`.
        pub fn count(&self, event: &str) -> usize {
            self.outbox
                .messages()
                .iter()
                .filter(|m| m.event() == Some(event))
                .count()
        }

        pub fn last(&self, event: &str) -> Option<&Value> {
            self.outbox
                .messages()
                .iter()
                .rev()
                .find(|m| m.event() == Some(event))
                .and_then(|m| m.payload())
        }
    }
}
