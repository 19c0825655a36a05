//! Region-queens: every player races to solve the same generated puzzle.
//!
//! Phases: `pending` → `solving` → `results`. The round finishes when the
//! solve timer runs out or as soon as every participant has solved.

pub mod puzzle;

pub use puzzle::{GenerationError, PlacementError, Puzzle};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::QueensConfig;
use crate::games::{
    losers, rank_by, remaining_ms, ActionError, Game, GameInitError, Participant, PhaseTimers,
    Round, RoundContext, RESULTS_PHASE,
};
use crate::state::lobby::MIN_ROUND_PLAYERS;
use crate::state::player::PlayerId;

const GAME_ID: &str = "queens";

/// Timer ending the solving phase.
const SOLVE_TIMEOUT: &str = "solve-timeout";

/// Registry entry.
#[derive(Debug, Clone, Default)]
pub struct QueensGame {
    config: QueensConfig,
}

impl QueensGame {
    pub fn new(config: QueensConfig) -> Self {
        Self { config }
    }
}

impl Game for QueensGame {
    fn id(&self) -> &'static str {
        GAME_ID
    }

    fn name(&self) -> &'static str {
        "Queens"
    }

    fn description(&self) -> &'static str {
        "Place one queen per row, column and colour region without any touching. Fastest solver wins."
    }

    fn min_players(&self) -> usize {
        MIN_ROUND_PLAYERS
    }

    fn init(
        &self,
        participants: &[Participant],
        rng: &mut dyn RngCore,
    ) -> Result<Box<dyn Round>, GameInitError> {
        if participants.len() < self.min_players() {
            return Err(GameInitError::NotEnoughPlayers {
                min: self.min_players(),
                found: participants.len(),
            });
        }

        let puzzle = puzzle::generate(&self.config, rng)?;
        Ok(Box::new(QueensRound::new(
            puzzle,
            participants.to_vec(),
            self.config.time_limit,
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueensPhase {
    Pending,
    Solving,
    Results,
}

impl QueensPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Solving => "solving",
            Self::Results => RESULTS_PHASE,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Progress {
    attempts: u32,
    solved_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Submission {
    placements: Vec<(usize, usize)>,
}

/// One region-queens round.
#[derive(Debug)]
pub struct QueensRound {
    puzzle: Puzzle,
    time_limit: Duration,
    phase: QueensPhase,
    phase_started_at: Option<Instant>,
    participants: Vec<Participant>,
    progress: HashMap<PlayerId, Progress>,

    /// Solvers in the order they were announced
    solved_order: Vec<PlayerId>,

    timers: PhaseTimers,
    results: Option<Value>,
}

impl QueensRound {
    pub fn new(puzzle: Puzzle, participants: Vec<Participant>, time_limit: Duration) -> Self {
        let progress = participants
            .iter()
            .map(|p| (p.id.clone(), Progress::default()))
            .collect();

        Self {
            puzzle,
            time_limit,
            phase: QueensPhase::Pending,
            phase_started_at: None,
            participants,
            progress,
            solved_order: Vec::new(),
            timers: PhaseTimers::new(),
            results: None,
        }
    }

    pub fn puzzle(&self) -> &Puzzle {
        &self.puzzle
    }

    fn deadline(&self) -> Option<Instant> {
        self.phase_started_at.map(|at| at + self.time_limit)
    }

    fn all_solved(&self) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|p| self.progress.get(&p.id).is_some_and(|pr| pr.solved_ms.is_some()))
    }

    fn display_name(&self, player_id: &str) -> &str {
        self.participants
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.display_name.as_str())
            .unwrap_or_default()
    }

    fn submit(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player_id: &str,
        data: &Value,
    ) -> Result<Value, ActionError> {
        let started_at = self
            .phase_started_at
            .ok_or(ActionError::WrongPhase(self.phase.as_str()))?;
        let progress = self
            .progress
            .get_mut(player_id)
            .ok_or(ActionError::NotParticipant)?;

        if let Some(elapsed) = progress.solved_ms {
            return Ok(json!({
                "correct": true,
                "alreadySolved": true,
                "elapsedMs": elapsed
            }));
        }

        let submission: Submission = serde_json::from_value(data.clone())
            .map_err(|e| ActionError::InvalidPayload(e.to_string()))?;

        progress.attempts += 1;
        if let Err(e) = puzzle::verify(&self.puzzle.regions, &submission.placements) {
            return Ok(json!({
                "correct": false,
                "reason": e.code(),
                "message": e.to_string(),
                "attempts": progress.attempts
            }));
        }

        let elapsed = ctx.now.saturating_duration_since(started_at).as_millis() as u64;
        progress.solved_ms = Some(elapsed);
        self.solved_order.push(player_id.to_string());
        let place = self.solved_order.len();

        ctx.broadcast(
            "queens:player-solved",
            json!({
                "playerId": player_id,
                "displayName": self.display_name(player_id),
                "elapsedMs": elapsed,
                "place": place
            }),
        );

        if self.all_solved() {
            self.finish(ctx);
        }

        Ok(json!({
            "correct": true,
            "elapsedMs": elapsed,
            "place": place
        }))
    }

    fn standings(&self) -> (Vec<Value>, Vec<PlayerId>) {
        let entries: Vec<(&Participant, Progress)> = self
            .participants
            .iter()
            .map(|p| (p, self.progress.get(&p.id).cloned().unwrap_or_default()))
            .collect();

        // Solvers by time, then every non-solver tied.
        let ranked = rank_by(entries, |(_, pr)| (pr.solved_ms.is_none(), pr.solved_ms));

        let standings = ranked
            .iter()
            .map(|r| {
                let (p, pr) = &r.entry;
                json!({
                    "playerId": p.id,
                    "displayName": p.display_name,
                    "rank": r.rank,
                    "solved": pr.solved_ms.is_some(),
                    "elapsedMs": pr.solved_ms,
                    "attempts": pr.attempts
                })
            })
            .collect();

        let losers = losers(&ranked).into_iter().map(|(p, _)| p.id.clone()).collect();
        (standings, losers)
    }
}

impl Round for QueensRound {
    fn game_id(&self) -> &'static str {
        GAME_ID
    }

    fn phase(&self) -> &'static str {
        self.phase.as_str()
    }

    fn start(&mut self, ctx: &mut RoundContext<'_>) {
        if self.phase != QueensPhase::Pending {
            return;
        }

        self.phase = QueensPhase::Solving;
        self.phase_started_at = Some(ctx.now);
        ctx.schedule(&mut self.timers, SOLVE_TIMEOUT, self.time_limit);

        let time_limit_ms = self.time_limit.as_millis() as u64;
        ctx.broadcast(
            "round:phase",
            json!({
                "gameId": GAME_ID,
                "phase": self.phase.as_str(),
                "durationMs": time_limit_ms
            }),
        );
        ctx.broadcast(
            "queens:puzzle",
            json!({
                "size": self.puzzle.size,
                "regions": self.puzzle.regions,
                "timeLimitMs": time_limit_ms
            }),
        );
    }

    fn handle_action(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player_id: &str,
        action: &str,
        data: &Value,
    ) -> Result<Value, ActionError> {
        match self.phase {
            QueensPhase::Results => return Err(ActionError::RoundFinished),
            QueensPhase::Pending => return Err(ActionError::WrongPhase(self.phase.as_str())),
            QueensPhase::Solving => {}
        }

        match action {
            "submit" => self.submit(ctx, player_id, data),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn on_timer(&mut self, ctx: &mut RoundContext<'_>, key: &'static str) {
        self.timers.forget(key);
        if key == SOLVE_TIMEOUT {
            self.finish(ctx);
        }
    }

    fn on_player_left(&mut self, ctx: &mut RoundContext<'_>, player_id: &str) {
        self.participants.retain(|p| p.id != player_id);
        self.progress.remove(player_id);

        if self.phase == QueensPhase::Solving
            && (self.participants.is_empty() || self.all_solved())
        {
            self.finish(ctx);
        }
    }

    fn finish(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if self.phase == QueensPhase::Results {
            return false;
        }

        ctx.cancel_all(&mut self.timers);
        self.phase = QueensPhase::Results;

        let (standings, losers) = self.standings();
        let results = json!({
            "gameId": GAME_ID,
            "standings": standings,
            "losers": losers,
            "solution": self.puzzle.solution_cells()
        });
        ctx.broadcast("round:results", results.clone());
        self.results = Some(results);
        true
    }

    fn reconnect_state(&self, now: Instant, player_id: &str) -> Value {
        let remaining = match (self.phase, self.deadline()) {
            (QueensPhase::Solving, Some(deadline)) => remaining_ms(now, deadline),
            (QueensPhase::Pending, _) => self.time_limit.as_millis() as u64,
            _ => 0,
        };
        let own = self.progress.get(player_id).cloned().unwrap_or_default();

        json!({
            "gameId": GAME_ID,
            "phase": self.phase.as_str(),
            "size": self.puzzle.size,
            "regions": self.puzzle.regions,
            "timeLimitMs": self.time_limit.as_millis() as u64,
            "remainingMs": remaining,
            "solved": own.solved_ms.is_some(),
            "elapsedMs": own.solved_ms,
            "attempts": own.attempts,
            "solvedPlayers": self.solved_order,
            "results": self.results
        })
    }

    fn end(&mut self, ctx: &mut RoundContext<'_>) {
        ctx.cancel_all(&mut self.timers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::testing::Harness;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const LIMIT: Duration = Duration::from_secs(180);

    fn setup(names: &[&str]) -> (Harness, QueensRound) {
        let mut harness = Harness::new(names);
        let mut round = QueensRound::new(puzzle::fixture_puzzle(), harness.participants(), LIMIT);
        round.start(&mut harness.ctx());
        (harness, round)
    }

    fn answer() -> Value {
        json!({ "placements": [[0, 3], [1, 1], [2, 5], [3, 0], [4, 4], [5, 2]] })
    }

    fn wrong() -> Value {
        json!({ "placements": [[0, 1], [1, 3], [2, 5], [3, 0], [4, 2], [5, 4]] })
    }

    fn submit(
        harness: &mut Harness,
        round: &mut QueensRound,
        who: &str,
        data: Value,
    ) -> Result<Value, ActionError> {
        round.handle_action(&mut harness.ctx(), who, "submit", &data)
    }

    #[test]
    fn test_start_broadcasts_puzzle_and_arms_timer() {
        let (harness, round) = setup(&["a", "b"]);

        assert_eq!(round.phase(), "solving");
        let puzzle = harness.last("queens:puzzle").unwrap();
        assert_eq!(puzzle["size"], 6);
        assert_eq!(puzzle["timeLimitMs"], 180_000);
        assert!(puzzle.get("solution").is_none());
        assert_eq!(harness.scheduler.next_deadline(), Some(harness.now + LIMIT));
    }

    #[test]
    fn test_wrong_then_right_submission() {
        let (mut harness, mut round) = setup(&["a", "b"]);

        let result = submit(&mut harness, &mut round, "a", wrong()).unwrap();
        assert_eq!(result["correct"], false);
        assert_eq!(result["reason"], "duplicate_region");
        assert_eq!(harness.count("queens:player-solved"), 0);

        harness.now += Duration::from_secs(42);
        let result = submit(&mut harness, &mut round, "a", answer()).unwrap();
        assert_eq!(result, json!({ "correct": true, "elapsedMs": 42_000, "place": 1 }));

        let solved = harness.last("queens:player-solved").unwrap();
        assert_eq!(solved["playerId"], "a");
        assert_eq!(solved["displayName"], "a");
        assert_eq!(round.phase(), "solving");
    }

    #[test]
    fn test_resubmit_after_solving_is_idempotent() {
        let (mut harness, mut round) = setup(&["a", "b"]);
        submit(&mut harness, &mut round, "a", answer()).unwrap();

        let again = submit(&mut harness, &mut round, "a", wrong()).unwrap();
        assert_eq!(again["correct"], true);
        assert_eq!(again["alreadySolved"], true);
        assert_eq!(harness.count("queens:player-solved"), 1);
    }

    #[test]
    fn test_last_solver_finishes_early_and_cancels_timer() {
        let (mut harness, mut round) = setup(&["a", "b"]);

        harness.now += Duration::from_secs(10);
        submit(&mut harness, &mut round, "b", answer()).unwrap();
        harness.now += Duration::from_secs(5);
        submit(&mut harness, &mut round, "a", answer()).unwrap();

        assert_eq!(round.phase(), RESULTS_PHASE);
        assert!(harness.scheduler.is_empty());
        assert_eq!(harness.count("round:results"), 1);

        let results = harness.last("round:results").unwrap();
        assert_eq!(results["standings"][0]["playerId"], "b");
        assert_eq!(results["standings"][1]["rank"], 2);
        assert_eq!(results["losers"], json!(["a"]));
        assert_eq!(results["solution"][0], json!([0, 3]));

        // The timeout would have fired here; nothing is left to fire.
        harness.advance(LIMIT, &mut round);
        assert_eq!(harness.count("round:results"), 1);
    }

    #[test]
    fn test_timeout_ties_non_solvers() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);
        submit(&mut harness, &mut round, "c", answer()).unwrap();

        harness.advance(LIMIT, &mut round);

        assert!(round.is_finished());
        let results = harness.last("round:results").unwrap();
        assert_eq!(results["standings"][0]["playerId"], "c");
        assert_eq!(results["standings"][1]["rank"], 2);
        assert_eq!(results["standings"][2]["rank"], 2);
        assert_eq!(results["losers"], json!(["a", "b"]));
    }

    #[test]
    fn test_double_finish_is_single_transition() {
        let (mut harness, mut round) = setup(&["a", "b"]);

        assert!(round.finish(&mut harness.ctx()));
        assert!(!round.finish(&mut harness.ctx()));
        assert_eq!(harness.count("round:results"), 1);
        assert!(harness.last("round:results").unwrap()["losers"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_actions_rejected_after_results() {
        let (mut harness, mut round) = setup(&["a", "b"]);
        round.finish(&mut harness.ctx());

        assert_eq!(
            submit(&mut harness, &mut round, "a", answer()),
            Err(ActionError::RoundFinished)
        );
    }

    #[test]
    fn test_bad_requests() {
        let (mut harness, mut round) = setup(&["a", "b"]);

        assert_eq!(
            submit(&mut harness, &mut round, "zz", answer()),
            Err(ActionError::NotParticipant)
        );
        assert!(matches!(
            submit(&mut harness, &mut round, "a", json!({ "placements": "nope" })),
            Err(ActionError::InvalidPayload(_))
        ));
        assert_eq!(
            round.handle_action(&mut harness.ctx(), "a", "hint", &Value::Null),
            Err(ActionError::UnknownAction("hint".to_string()))
        );
    }

    #[test]
    fn test_leaver_completes_round() {
        let (mut harness, mut round) = setup(&["a", "b"]);
        submit(&mut harness, &mut round, "a", answer()).unwrap();

        round.on_player_left(&mut harness.ctx(), "b");
        assert!(round.is_finished());
        assert!(harness.scheduler.is_empty());
    }

    #[test]
    fn test_reconnect_snapshot() {
        let (mut harness, mut round) = setup(&["a", "b"]);
        submit(&mut harness, &mut round, "a", wrong()).unwrap();
        harness.now += Duration::from_secs(30);
        submit(&mut harness, &mut round, "b", answer()).unwrap();

        harness.now += Duration::from_secs(30);
        let snapshot = round.reconnect_state(harness.now, "a");

        assert_eq!(snapshot["regions"], json!(puzzle::fixture_puzzle().regions));
        assert_eq!(snapshot["remainingMs"], 120_000);
        assert_eq!(snapshot["timeLimitMs"], 180_000);
        assert_eq!(snapshot["solved"], false);
        assert_eq!(snapshot["attempts"], 1);
        assert_eq!(snapshot["solvedPlayers"], json!(["b"]));
        assert!(snapshot.get("solution").is_none());
        assert!(snapshot["results"].is_null());
    }

    #[test]
    fn test_init_rejects_lone_player() {
        let game = QueensGame::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let lone = vec![Participant {
            id: "a".to_string(),
            display_name: "Alice".to_string(),
        }];

        assert!(matches!(
            game.init(&lone, &mut rng),
            Err(GameInitError::NotEnoughPlayers { min: 2, found: 1 })
        ));
    }
}
