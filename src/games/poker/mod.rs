//! Poker showdown: everyone is dealt two private cards, the board is
//! revealed in stages and the best five-card hand wins.
//!
//! Phases: `pending` → `hole` → `reveal` → `results`. The hole phase ends
//! when every participant is ready or the hole timer runs out. The reveal
//! phase is a chain of paced timers: flop on entry, then turn, river and
//! showdown.

pub mod cards;
pub mod hand;

pub use cards::{Card, Deck, Rank, Suit};
pub use hand::{best_hand, evaluate_five, BestHand, HandCategory, HandValue};

use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Instant;

use rand::RngCore;
use serde_json::{json, Value};

use crate::config::PokerConfig;
use crate::games::{
    losers, rank_by, remaining_ms, ActionError, Game, GameInitError, Participant, PhaseTimers,
    Round, RoundContext, RESULTS_PHASE,
};
use crate::state::lobby::MIN_ROUND_PLAYERS;
use crate::state::player::PlayerId;

const GAME_ID: &str = "poker";

const HOLE_TIMEOUT: &str = "hole-timeout";
const REVEAL_TURN: &str = "reveal-turn";
const REVEAL_RIVER: &str = "reveal-river";
const SHOWDOWN: &str = "showdown";

/// Players one deck can serve (two hole cards each, five on the board).
pub const MAX_POKER_PLAYERS: usize = (52 - 5) / 2;

/// Registry entry.
#[derive(Debug, Clone, Default)]
pub struct PokerGame {
    config: PokerConfig,
}

impl PokerGame {
    pub fn new(config: PokerConfig) -> Self {
        Self { config }
    }
}

impl Game for PokerGame {
    fn id(&self) -> &'static str {
        GAME_ID
    }

    fn name(&self) -> &'static str {
        "Poker Showdown"
    }

    fn description(&self) -> &'static str {
        "Two hole cards each, five on the board. Best five-card hand wins; worst hand loses."
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
        if participants.len() > MAX_POKER_PLAYERS {
            return Err(GameInitError::TooManyPlayers {
                max: MAX_POKER_PLAYERS,
                found: participants.len(),
            });
        }

        let mut deck = Deck::shuffled(rng);
        let mut hole = Vec::with_capacity(participants.len());
        for _ in participants {
            match deck.deal(2).as_deref() {
                Some(&[a, b]) => hole.push([a, b]),
                _ => {
                    return Err(GameInitError::TooManyPlayers {
                        max: MAX_POKER_PLAYERS,
                        found: participants.len(),
                    })
                }
            }
        }
        let community = match deck.deal(5).as_deref() {
            Some(&[a, b, c, d, e]) => [a, b, c, d, e],
            _ => {
                return Err(GameInitError::TooManyPlayers {
                    max: MAX_POKER_PLAYERS,
                    found: participants.len(),
                })
            }
        };

        Ok(Box::new(PokerRound::new(
            participants.to_vec(),
            hole,
            community,
            self.config.clone(),
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PokerPhase {
    Pending,
    Hole,
    Reveal,
    Results,
}

impl PokerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Hole => "hole",
            Self::Reveal => "reveal",
            Self::Results => RESULTS_PHASE,
        }
    }
}

/// One poker showdown round.
#[derive(Debug)]
pub struct PokerRound {
    config: PokerConfig,
    phase: PokerPhase,
    phase_started_at: Option<Instant>,
    participants: Vec<Participant>,
    hole: HashMap<PlayerId, [Card; 2]>,
    community: [Card; 5],

    /// Community cards shown so far (0, 3, 4 or 5)
    revealed: usize,

    /// Ready players in the order they confirmed
    ready: Vec<PlayerId>,

    timers: PhaseTimers,
    results: Option<Value>,
}

impl PokerRound {
    /// Round with a fixed deal; `hole[i]` belongs to `participants[i]`.
    pub fn new(
        participants: Vec<Participant>,
        hole: Vec<[Card; 2]>,
        community: [Card; 5],
        config: PokerConfig,
    ) -> Self {
        let hole = participants
            .iter()
            .map(|p| p.id.clone())
            .zip(hole)
            .collect();

        Self {
            config,
            phase: PokerPhase::Pending,
            phase_started_at: None,
            participants,
            hole,
            community,
            revealed: 0,
            ready: Vec::new(),
            timers: PhaseTimers::new(),
            results: None,
        }
    }

    fn visible_community(&self) -> &[Card] {
        &self.community[..self.revealed]
    }

    fn all_ready(&self) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|p| self.ready.contains(&p.id))
    }

    fn display_name(&self, player_id: &str) -> &str {
        self.participants
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.display_name.as_str())
            .unwrap_or_default()
    }

    fn mark_ready(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player_id: &str,
    ) -> Result<Value, ActionError> {
        if self.phase != PokerPhase::Hole {
            return Err(ActionError::WrongPhase(self.phase.as_str()));
        }
        if !self.hole.contains_key(player_id) {
            return Err(ActionError::NotParticipant);
        }
        if self.ready.iter().any(|id| id == player_id) {
            return Ok(json!({ "ready": true, "alreadyReady": true }));
        }

        self.ready.push(player_id.to_string());
        ctx.broadcast(
            "poker:player-ready",
            json!({
                "playerId": player_id,
                "displayName": self.display_name(player_id),
                "readyCount": self.ready.len(),
                "total": self.participants.len()
            }),
        );

        if self.all_ready() {
            ctx.cancel(&mut self.timers, HOLE_TIMEOUT);
            self.begin_reveal(ctx);
        }

        Ok(json!({ "ready": true }))
    }

    fn begin_reveal(&mut self, ctx: &mut RoundContext<'_>) {
        self.phase = PokerPhase::Reveal;
        self.phase_started_at = Some(ctx.now);
        ctx.broadcast(
            "round:phase",
            json!({ "gameId": GAME_ID, "phase": self.phase.as_str() }),
        );
        self.reveal(ctx, 3, "flop");
        ctx.schedule(&mut self.timers, REVEAL_TURN, self.config.reveal_pacing);
    }

    fn reveal(&mut self, ctx: &mut RoundContext<'_>, upto: usize, stage: &str) {
        self.revealed = upto;
        ctx.broadcast(
            "poker:community",
            json!({ "stage": stage, "cards": self.visible_community() }),
        );
    }

    fn standings(&self) -> (Vec<Value>, Vec<PlayerId>) {
        let entries: Vec<(&Participant, [Card; 2], BestHand)> = self
            .participants
            .iter()
            .filter_map(|p| {
                let hole = *self.hole.get(&p.id)?;
                let mut seven: Vec<Card> = hole.to_vec();
                seven.extend_from_slice(&self.community);
                Some((p, hole, best_hand(&seven)?))
            })
            .collect();

        let ranked = rank_by(entries, |(_, _, best)| Reverse(best.value.clone()));

        let standings = ranked
            .iter()
            .map(|r| {
                let (p, hole, best) = &r.entry;
                json!({
                    "playerId": p.id,
                    "displayName": p.display_name,
                    "rank": r.rank,
                    "holeCards": hole,
                    "hand": {
                        "category": best.value.category,
                        "name": best.value.name(),
                        "tiebreak": best.value.tiebreak,
                        "cards": best.cards
                    }
                })
            })
            .collect();

        let losers = losers(&ranked)
            .into_iter()
            .map(|(p, _, _)| p.id.clone())
            .collect();
        (standings, losers)
    }
}

impl Round for PokerRound {
    fn game_id(&self) -> &'static str {
        GAME_ID
    }

    fn phase(&self) -> &'static str {
        self.phase.as_str()
    }

    fn start(&mut self, ctx: &mut RoundContext<'_>) {
        if self.phase != PokerPhase::Pending {
            return;
        }

        self.phase = PokerPhase::Hole;
        self.phase_started_at = Some(ctx.now);

        for p in &self.participants {
            if let Some(cards) = self.hole.get(&p.id) {
                ctx.send_to(&p.id, "poker:hole-cards", json!({ "cards": cards }));
            }
        }
        ctx.broadcast(
            "round:phase",
            json!({
                "gameId": GAME_ID,
                "phase": self.phase.as_str(),
                "durationMs": self.config.hole_time.as_millis() as u64
            }),
        );
        ctx.schedule(&mut self.timers, HOLE_TIMEOUT, self.config.hole_time);
    }

    fn handle_action(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player_id: &str,
        action: &str,
        _data: &Value,
    ) -> Result<Value, ActionError> {
        match self.phase {
            PokerPhase::Results => return Err(ActionError::RoundFinished),
            PokerPhase::Pending => return Err(ActionError::WrongPhase(self.phase.as_str())),
            PokerPhase::Hole | PokerPhase::Reveal => {}
        }

        match action {
            "ready" => self.mark_ready(ctx, player_id),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }

    fn on_timer(&mut self, ctx: &mut RoundContext<'_>, key: &'static str) {
        self.timers.forget(key);

        match (self.phase, key) {
            (PokerPhase::Hole, HOLE_TIMEOUT) => self.begin_reveal(ctx),
            (PokerPhase::Reveal, REVEAL_TURN) => {
                self.reveal(ctx, 4, "turn");
                ctx.schedule(&mut self.timers, REVEAL_RIVER, self.config.reveal_pacing);
            }
            (PokerPhase::Reveal, REVEAL_RIVER) => {
                self.reveal(ctx, 5, "river");
                ctx.schedule(&mut self.timers, SHOWDOWN, self.config.reveal_pacing);
            }
            (PokerPhase::Reveal, SHOWDOWN) => {
                self.finish(ctx);
            }
            (phase, key) => {
                tracing::debug!(phase = phase.as_str(), key, "ignoring poker timer");
            }
        }
    }

    fn on_player_left(&mut self, ctx: &mut RoundContext<'_>, player_id: &str) {
        self.participants.retain(|p| p.id != player_id);
        self.hole.remove(player_id);
        self.ready.retain(|id| id != player_id);

        match self.phase {
            PokerPhase::Results => {}
            _ if self.participants.is_empty() => {
                self.finish(ctx);
            }
            PokerPhase::Hole if self.all_ready() => {
                ctx.cancel(&mut self.timers, HOLE_TIMEOUT);
                self.begin_reveal(ctx);
            }
            _ => {}
        }
    }

    fn finish(&mut self, ctx: &mut RoundContext<'_>) -> bool {
        if self.phase == PokerPhase::Results {
            return false;
        }

        ctx.cancel_all(&mut self.timers);
        self.phase = PokerPhase::Results;
        self.revealed = self.community.len();

        let (standings, losers) = self.standings();
        let results = json!({
            "gameId": GAME_ID,
            "community": self.community,
            "standings": standings,
            "losers": losers
        });
        ctx.broadcast("round:results", results.clone());
        self.results = Some(results);
        true
    }

    fn reconnect_state(&self, now: Instant, player_id: &str) -> Value {
        let remaining = match (self.phase, self.phase_started_at) {
            (PokerPhase::Hole, Some(at)) => remaining_ms(now, at + self.config.hole_time),
            _ => 0,
        };

        json!({
            "gameId": GAME_ID,
            "phase": self.phase.as_str(),
            "holeCards": self.hole.get(player_id),
            "community": self.visible_community(),
            "readyPlayers": self.ready,
            "remainingMs": remaining,
            "results": self.results
        })
    }

    fn end(&mut self, ctx: &mut RoundContext<'_>) {
        ctx.cancel_all(&mut self.timers);
    }
}

#[cfg(test)]
mod tests {
    use super::cards::{Rank::*, Suit::*};
    use super::*;
    use crate::games::testing::Harness;
    use crate::protocol::Outbound;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::time::Duration;

    const PACING: Duration = Duration::from_secs(2);
    const HOLE: Duration = Duration::from_secs(20);

    fn c(rank: Rank, suit: Suit) -> Card {
        Card::new(rank, suit)
    }

    /// a: full house; b and c: pair of twos with ace-king, tied.
    fn fixed_round(harness: &Harness) -> PokerRound {
        let participants = harness.participants();
        let hole = vec![
            [c(Seven, Spades), c(Seven, Hearts)],
            [c(Ace, Clubs), c(King, Diamonds)],
            [c(Ace, Diamonds), c(King, Hearts)],
        ];
        let community = [
            c(Seven, Diamonds),
            c(Two, Clubs),
            c(Two, Spades),
            c(Nine, Hearts),
            c(Four, Clubs),
        ];
        PokerRound::new(
            participants[..hole.len().min(participants.len())].to_vec(),
            hole,
            community,
            PokerConfig::default(),
        )
    }

    fn setup(names: &[&str]) -> (Harness, PokerRound) {
        let mut harness = Harness::new(names);
        let mut round = fixed_round(&harness);
        round.start(&mut harness.ctx());
        (harness, round)
    }

    fn ready(harness: &mut Harness, round: &mut PokerRound, who: &str) -> Result<Value, ActionError> {
        round.handle_action(&mut harness.ctx(), who, "ready", &Value::Null)
    }

    #[test]
    fn test_start_unicasts_hole_cards() {
        let (harness, round) = setup(&["a", "b", "c"]);

        assert_eq!(round.phase(), "hole");
        let unicasts: Vec<&Outbound> = harness
            .outbox
            .messages()
            .iter()
            .filter(|m| m.event() == Some("poker:hole-cards"))
            .collect();
        assert_eq!(unicasts.len(), 3);
        match unicasts[0] {
            Outbound::Unicast { connection, payload, .. } => {
                assert_eq!(connection, "conn-a");
                assert_eq!(payload["cards"][0]["rank"], "seven");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(harness.scheduler.next_deadline(), Some(harness.now + HOLE));
    }

    #[test]
    fn test_hole_cards_skip_disconnected() {
        let mut harness = Harness::new(&["a", "b", "c"]);
        harness.roster[1].disconnect(harness.now, 1);
        let mut round = fixed_round(&harness);
        round.start(&mut harness.ctx());

        assert_eq!(harness.count("poker:hole-cards"), 2);
        let snapshot = round.reconnect_state(harness.now, "b");
        assert_eq!(snapshot["holeCards"][0]["rank"], "ace");
    }

    #[test]
    fn test_ready_is_idempotent() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);

        assert_eq!(ready(&mut harness, &mut round, "a").unwrap(), json!({ "ready": true }));
        let again = ready(&mut harness, &mut round, "a").unwrap();
        assert_eq!(again["alreadyReady"], true);
        assert_eq!(harness.count("poker:player-ready"), 1);
        assert_eq!(round.phase(), "hole");
    }

    #[test]
    fn test_all_ready_cancels_timeout_and_reveals_flop() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);

        for who in ["a", "b", "c"] {
            ready(&mut harness, &mut round, who).unwrap();
        }

        assert_eq!(round.phase(), "reveal");
        let flop = harness.last("poker:community").unwrap();
        assert_eq!(flop["stage"], "flop");
        assert_eq!(flop["cards"].as_array().unwrap().len(), 3);
        // Only the turn timer remains
        assert_eq!(harness.scheduler.len(), 1);
        assert_eq!(harness.scheduler.next_deadline(), Some(harness.now + PACING));

        assert_eq!(
            ready(&mut harness, &mut round, "a"),
            Err(ActionError::WrongPhase("reveal"))
        );
    }

    #[test]
    fn test_staged_reveal_to_results() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);

        harness.advance(HOLE, &mut round);
        assert_eq!(round.phase(), "reveal");

        harness.advance(PACING, &mut round);
        assert_eq!(harness.last("poker:community").unwrap()["stage"], "turn");

        harness.advance(PACING, &mut round);
        assert_eq!(harness.last("poker:community").unwrap()["stage"], "river");
        assert!(!round.is_finished());

        harness.advance(PACING, &mut round);
        assert!(round.is_finished());
        assert!(harness.scheduler.is_empty());
        assert_eq!(harness.count("poker:community"), 3);
        assert_eq!(harness.count("round:results"), 1);

        let results = harness.last("round:results").unwrap();
        assert_eq!(results["standings"][0]["playerId"], "a");
        assert_eq!(results["standings"][0]["hand"]["category"], "full-house");
        assert_eq!(results["standings"][0]["hand"]["tiebreak"], json!([7, 2]));
        // b and c hold identical hands and share the last place
        assert_eq!(results["standings"][1]["rank"], 2);
        assert_eq!(results["standings"][2]["rank"], 2);
        assert_eq!(results["losers"], json!(["b", "c"]));
    }

    #[test]
    fn test_double_finish_is_single_transition() {
        let (mut harness, mut round) = setup(&["a", "b"]);

        assert!(round.finish(&mut harness.ctx()));
        assert!(!round.finish(&mut harness.ctx()));
        assert_eq!(harness.count("round:results"), 1);
        assert!(harness.scheduler.is_empty());
        assert_eq!(
            ready(&mut harness, &mut round, "a"),
            Err(ActionError::RoundFinished)
        );
    }

    #[test]
    fn test_reconnect_snapshot_is_private() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);
        ready(&mut harness, &mut round, "b").unwrap();

        let snapshot = round.reconnect_state(harness.now + Duration::from_secs(5), "a");
        assert_eq!(snapshot["phase"], "hole");
        assert_eq!(snapshot["holeCards"][0]["rank"], "seven");
        assert_eq!(snapshot["community"], json!([]));
        assert_eq!(snapshot["readyPlayers"], json!(["b"]));
        assert_eq!(snapshot["remainingMs"], 15_000);
        assert!(!snapshot.to_string().contains("king"));
    }

    #[test]
    fn test_leaver_unblocks_reveal() {
        let (mut harness, mut round) = setup(&["a", "b", "c"]);
        ready(&mut harness, &mut round, "a").unwrap();
        ready(&mut harness, &mut round, "b").unwrap();

        round.on_player_left(&mut harness.ctx(), "c");
        assert_eq!(round.phase(), "reveal");
        assert_eq!(harness.scheduler.len(), 1);
    }

    #[test]
    fn test_init_deals_distinct_cards() {
        let harness = Harness::new(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let round = PokerGame::default()
            .init(&harness.participants(), &mut rng)
            .unwrap();
        assert_eq!(round.phase(), "pending");

        let mut seen = std::collections::HashSet::new();
        for p in harness.participants() {
            let snapshot = round.reconnect_state(harness.now, &p.id);
            for card in snapshot["holeCards"].as_array().unwrap() {
                assert!(seen.insert(card.to_string()));
            }
        }
        assert_eq!(seen.len(), 16);
    }
}
