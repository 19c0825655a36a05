//! Best-five-of-seven hand evaluation.
//!
//! [`HandValue`] is totally ordered: category first, then the category's
//! tie-break ranks compared left to right. Equal values are genuine ties.

use std::cmp::Ordering;

use serde::Serialize;

use super::cards::Card;

/// Hand categories, weakest first.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandCategory {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
}

/// Comparable strength of a five-card hand.
///
/// Tie-break layout per category:
///
/// | Category | Ranks |
/// |---|---|
/// | straight flush, straight | high card (5 for the wheel) |
/// | four of a kind | quad, kicker |
/// | full house | trips, pair |
/// | flush, high card | all five, descending |
/// | three of a kind | trips, two kickers |
/// | two pair | high pair, low pair, kicker |
/// | one pair | pair, three kickers |
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct HandValue {
    pub category: HandCategory,
    pub tiebreak: Vec<u8>,
}

impl HandValue {
    pub fn is_royal(&self) -> bool {
        self.category == HandCategory::StraightFlush && self.tiebreak.first() == Some(&14)
    }

    /// Display name of the hand.
    pub fn name(&self) -> &'static str {
        if self.is_royal() {
            return "Royal Flush";
        }
        match self.category {
            HandCategory::HighCard => "High Card",
            HandCategory::OnePair => "One Pair",
            HandCategory::TwoPair => "Two Pair",
            HandCategory::ThreeOfAKind => "Three of a Kind",
            HandCategory::Straight => "Straight",
            HandCategory::Flush => "Flush",
            HandCategory::FullHouse => "Full House",
            HandCategory::FourOfAKind => "Four of a Kind",
            HandCategory::StraightFlush => "Straight Flush",
        }
    }
}

/// A player's best hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestHand {
    pub value: HandValue,
    pub cards: [Card; 5],
}

/// Evaluate exactly five cards.
pub fn evaluate_five(cards: &[Card; 5]) -> HandValue {
    let mut values: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    // (count, rank), most frequent first, then highest
    let mut groups: Vec<(u8, u8)> = Vec::with_capacity(5);
    for &v in &values {
        match groups.iter_mut().find(|(_, rank)| *rank == v) {
            Some((count, _)) => *count += 1,
            None => groups.push((1, v)),
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));

    let flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight = straight_high(&values);
    let ranks: Vec<u8> = groups.iter().map(|&(_, rank)| rank).collect();
    let top = groups[0].0;
    let second = groups.get(1).map(|g| g.0);

    let (category, tiebreak) = match (straight, flush, top, second) {
        (Some(high), true, _, _) => (HandCategory::StraightFlush, vec![high]),
        (_, _, 4, _) => (HandCategory::FourOfAKind, ranks),
        (_, _, 3, Some(2)) => (HandCategory::FullHouse, ranks),
        (_, true, _, _) => (HandCategory::Flush, values),
        (Some(high), _, _, _) => (HandCategory::Straight, vec![high]),
        (_, _, 3, _) => (HandCategory::ThreeOfAKind, ranks),
        (_, _, 2, Some(2)) => (HandCategory::TwoPair, ranks),
        (_, _, 2, _) => (HandCategory::OnePair, ranks),
        _ => (HandCategory::HighCard, values),
    };

    HandValue { category, tiebreak }
}

/// High card of a straight over descending `values`, if they form one.
fn straight_high(values: &[u8]) -> Option<u8> {
    let distinct = values.windows(2).all(|w| w[0] != w[1]);
    if !distinct {
        return None;
    }
    if values[0] - values[4] == 4 {
        return Some(values[0]);
    }
    // A-5-4-3-2 plays the ace low
    if values == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

/// Best five-card hand among `cards` (five to seven cards).
pub fn best_hand(cards: &[Card]) -> Option<BestHand> {
    let n = cards.len();
    if !(5..=7).contains(&n) {
        return None;
    }

    let mut best: Option<BestHand> = None;
    for a in 0..n {
        for b in (a + 1)..n {
            for c in (b + 1)..n {
                for d in (c + 1)..n {
                    for e in (d + 1)..n {
                        let hand = [cards[a], cards[b], cards[c], cards[d], cards[e]];
                        let value = evaluate_five(&hand);
                        let better = match &best {
                            Some(current) => value.cmp(&current.value) == Ordering::Greater,
                            None => true,
                        };
                        if better {
                            best = Some(BestHand { value, cards: hand });
                        }
                    }
                }
            }
        }
    }
    best
}
