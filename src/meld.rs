use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cards::{Card, Rank, Suit, HAND_SIZE};
use crate::error::GinError;

/// Run-domain rank values: 0 is the ace played low, 1..=12 are Two..King,
/// and 13 is the ace played high. An ace in a hand occupies both ends.
pub(crate) const ACE_LOW: i32 = 0;
pub(crate) const ACE_HIGH: i32 = 13;

pub(crate) fn run_value(rank: Rank) -> i32 {
    rank as i32 - 1
}

pub(crate) fn value_to_rank(value: i32) -> Option<Rank> {
    match value {
        ACE_LOW | ACE_HIGH => Some(Rank::Ace),
        1..=12 => Rank::from_discriminant(value as u8 + 1),
        _ => None,
    }
}

pub(crate) fn cards_mask(cards: &[Card]) -> u64 {
    cards.iter().fold(0, |mask, card| mask | 1 << card.id())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeldKind {
    Set,
    Run,
}

/// A validated set or run. Cards are kept sorted; a run ending at the ace
/// keeps the ace last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Meld {
    kind: MeldKind,
    cards: Vec<Card>,
}

impl Meld {
    pub fn new(cards: Vec<Card>) -> Result<Self, GinError> {
        if cards_mask(&cards).count_ones() as usize != cards.len() {
            return Err(GinError::InvalidMeld(format!(
                "duplicate cards in {}",
                cards.iter().join(" ")
            )));
        }
        match classify(&cards) {
            Some(kind) => Ok(Self::from_parts(kind, cards)),
            None => Err(GinError::InvalidMeld(format!(
                "{} is neither a set nor a run",
                cards.iter().join(" ")
            ))),
        }
    }

    pub(crate) fn from_parts(kind: MeldKind, mut cards: Vec<Card>) -> Self {
        cards.sort();
        if cards[0].rank == Rank::Ace && cards[cards.len() - 1].rank == Rank::King {
            // ace-high run: present the ace after the king
            cards.rotate_left(1);
        }
        Self { kind, cards }
    }

    pub fn kind(&self) -> MeldKind {
        self.kind
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, card: Card) -> bool {
        self.cards.contains(&card)
    }

    fn smallest(&self) -> Option<Card> {
        self.cards.iter().min().copied()
    }
}

impl Display for Meld {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cards.iter().join(" "))
    }
}

impl Serialize for Meld {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cards.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Meld {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cards = Vec::<Card>::deserialize(deserializer)?;
        Meld::new(cards).map_err(D::Error::custom)
    }
}

fn classify(cards: &[Card]) -> Option<MeldKind> {
    if cards.len() < 3 {
        return None;
    }
    if cards.iter().all(|c| c.rank == cards[0].rank) {
        let distinct_suits = cards.iter().map(|c| c.suit).unique().count();
        return (cards.len() <= 4 && distinct_suits == cards.len()).then_some(MeldKind::Set);
    }
    run_span(cards).map(|_| MeldKind::Run)
}

/// The (low, high) run-domain span of a run, or None if the cards are not
/// one. An ace may sit at either end but not both.
pub(crate) fn run_span(cards: &[Card]) -> Option<(i32, i32)> {
    if cards.len() < 3 || cards.iter().any(|c| c.suit != cards[0].suit) {
        return None;
    }
    let ace_low: Vec<i32> = cards.iter().map(|c| run_value(c.rank)).collect();
    if let Some(span) = consecutive_span(ace_low) {
        return Some(span);
    }
    if cards.iter().any(|c| c.rank == Rank::Ace) {
        let ace_high = cards
            .iter()
            .map(|c| {
                if c.rank == Rank::Ace {
                    ACE_HIGH
                } else {
                    run_value(c.rank)
                }
            })
            .collect();
        return consecutive_span(ace_high);
    }
    None
}

fn consecutive_span(mut values: Vec<i32>) -> Option<(i32, i32)> {
    let n = values.len();
    values.sort_unstable();
    values.dedup();
    let consecutive = values.len() == n && values.windows(2).all(|w| w[1] == w[0] + 1);
    consecutive.then(|| (values[0], values[n - 1]))
}

/// The optimal (or caller-chosen) partition of a hand into melds plus
/// leftover deadwood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitHand {
    pub deadwood: u32,
    pub melds: Vec<Meld>,
    pub unmelded: Vec<Card>,
}

pub fn deadwood_value(cards: &[Card]) -> u32 {
    cards.iter().map(|c| c.rank.value()).sum()
}

pub(crate) fn validate_hand(hand: &[Card]) -> Result<u64, GinError> {
    if hand.is_empty() || hand.len() > HAND_SIZE + 1 {
        return Err(GinError::MalformedHand(format!(
            "hand of {} cards",
            hand.len()
        )));
    }
    let mask = cards_mask(hand);
    if mask.count_ones() as usize != hand.len() {
        return Err(GinError::MalformedHand(format!(
            "duplicate cards in {}",
            hand.iter().join(" ")
        )));
    }
    Ok(mask)
}

fn find_sets(cards: &[Card]) -> Vec<Meld> {
    let by_rank: BTreeMap<Rank, Vec<Card>> = cards
        .iter()
        .copied()
        .into_group_map_by(|card| card.rank)
        .into_iter()
        .collect();

    let mut sets = Vec::new();
    for (_, group) in by_rank {
        if group.len() == 3 {
            sets.push(Meld::from_parts(MeldKind::Set, group));
        } else if group.len() == 4 {
            sets.push(Meld::from_parts(MeldKind::Set, group.clone()));
            for combo in group.into_iter().combinations(3) {
                sets.push(Meld::from_parts(MeldKind::Set, combo));
            }
        }
    }
    sets
}

fn find_runs(cards: &[Card]) -> Vec<Meld> {
    let by_suit: BTreeMap<Suit, Vec<Card>> = cards
        .iter()
        .copied()
        .into_group_map_by(|card| card.suit)
        .into_iter()
        .collect();

    let mut runs = Vec::new();
    for (suit, suited) in by_suit {
        let mut values: Vec<i32> = suited
            .iter()
            .flat_map(|card| {
                if card.rank == Rank::Ace {
                    vec![ACE_LOW, ACE_HIGH]
                } else {
                    vec![run_value(card.rank)]
                }
            })
            .collect();
        values.sort_unstable();

        // maximal consecutive stretches, then every window of length >= 3
        let mut start = 0;
        while start < values.len() {
            let mut end = start + 1;
            while end < values.len() && values[end] == values[end - 1] + 1 {
                end += 1;
            }
            let stretch = &values[start..end];
            for len in 3..=stretch.len() {
                for window in stretch.windows(len) {
                    if window.contains(&ACE_LOW) && window.contains(&ACE_HIGH) {
                        // the same physical ace cannot sit at both ends
                        continue;
                    }
                    let run = window
                        .iter()
                        .filter_map(|&v| value_to_rank(v))
                        .map(|rank| Card::new(rank, suit))
                        .collect();
                    runs.push(Meld::from_parts(MeldKind::Run, run));
                }
            }
            start = end;
        }
    }
    runs
}

fn find_melds(cards: &[Card]) -> Vec<Meld> {
    let mut melds = find_sets(cards);
    melds.extend(find_runs(cards));
    melds
}

fn sort_melds(mut melds: Vec<Meld>) -> Vec<Meld> {
    melds.sort_by_key(|meld| (Reverse(meld.len()), meld.smallest()));
    melds
}

fn selection_key(split: &SplitHand) -> (u32, Reverse<usize>, Reverse<usize>, Option<Card>) {
    let largest = split.melds.iter().map(Meld::len).max().unwrap_or(0);
    (
        split.deadwood,
        Reverse(split.melds.len()),
        Reverse(largest),
        split.unmelded.first().copied(),
    )
}

/// Every way to split the hand at or under the deadwood ceiling, best first.
///
/// With `stop_on_gin` the search short-circuits to a single fully-melded
/// split as soon as one is found.
pub fn candidate_melds(
    hand: &[Card],
    max_deadwood: Option<u32>,
    stop_on_gin: bool,
) -> Result<Vec<SplitHand>, GinError> {
    validate_hand(hand)?;

    let mut sorted_hand = hand.to_vec();
    sorted_hand.sort();

    let mut candidates = Vec::new();
    let full_deadwood = deadwood_value(&sorted_hand);
    if max_deadwood.map_or(true, |max| full_deadwood <= max) {
        candidates.push(SplitHand {
            deadwood: full_deadwood,
            melds: Vec::new(),
            unmelded: sorted_hand.clone(),
        });
    }

    let all_melds = find_melds(&sorted_hand);
    let masks: Vec<u64> = all_melds.iter().map(|m| cards_mask(m.cards())).collect();

    // a hand of at most eleven cards never fits four disjoint melds
    for k in 1..=all_melds.len().min(3) {
        for combo in (0..all_melds.len()).combinations(k) {
            let mut melded = 0u64;
            let mut overlap = false;
            for &i in &combo {
                if melded & masks[i] != 0 {
                    overlap = true;
                    break;
                }
                melded |= masks[i];
            }
            if overlap {
                continue;
            }

            let unmelded: Vec<Card> = sorted_hand
                .iter()
                .copied()
                .filter(|card| melded & (1 << card.id()) == 0)
                .collect();
            let melds = sort_melds(combo.iter().map(|&i| all_melds[i].clone()).collect());
            if stop_on_gin && unmelded.is_empty() {
                return Ok(vec![SplitHand {
                    deadwood: 0,
                    melds,
                    unmelded,
                }]);
            }
            let deadwood = deadwood_value(&unmelded);
            if max_deadwood.map_or(true, |max| deadwood <= max) {
                candidates.push(SplitHand {
                    deadwood,
                    melds,
                    unmelded,
                });
            }
        }
    }

    candidates.sort_by_cached_key(selection_key);
    Ok(candidates)
}

/// Split a hand into melds and deadwood.
///
/// Without `chosen` the deadwood-minimal split is searched for; with it, the
/// caller's melds are honored and only validated and scored.
pub fn split_melds(hand: &[Card], chosen: Option<&[Meld]>) -> Result<SplitHand, GinError> {
    let hand_mask = validate_hand(hand)?;

    if let Some(chosen) = chosen {
        let mut melded = 0u64;
        for meld in chosen {
            let mask = cards_mask(meld.cards());
            if mask & hand_mask != mask {
                return Err(GinError::InvalidMeld(format!(
                    "{meld} uses cards not in the hand"
                )));
            }
            if mask & melded != 0 {
                return Err(GinError::InvalidMeld(format!(
                    "{meld} overlaps another chosen meld"
                )));
            }
            melded |= mask;
        }
        let mut unmelded: Vec<Card> = hand
            .iter()
            .copied()
            .filter(|card| melded & (1 << card.id()) == 0)
            .collect();
        unmelded.sort();
        return Ok(SplitHand {
            deadwood: deadwood_value(&unmelded),
            melds: sort_melds(chosen.to_vec()),
            unmelded,
        });
    }

    candidate_melds(hand, None, true)?
        .into_iter()
        .next()
        .ok_or_else(|| GinError::MalformedHand("empty hand".into()))
}

/// Present a hand melds-first: each meld in order, then the deadwood.
pub fn arrange_hand(hand: &[Card]) -> Result<Vec<Card>, GinError> {
    let split = split_melds(hand, None)?;
    let mut arranged: Vec<Card> = split
        .melds
        .iter()
        .flat_map(|meld| meld.cards().iter().copied())
        .collect();
    arranged.extend(split.unmelded);
    Ok(arranged)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::cards::cards_from_strings;
    use crate::deck::shuffled_deck;

    fn hand(codes: &str) -> Vec<Card> {
        codes
            .split_whitespace()
            .map(|code| code.parse().unwrap())
            .collect()
    }

    fn meld(codes: &str) -> Meld {
        Meld::new(hand(codes)).unwrap()
    }

    #[test]
    fn three_sets_leave_the_four() {
        let split = split_melds(&hand("Ac Ad Ah 2s 2d 2h 3c 3d 3h 4c"), None).unwrap();
        assert_eq!(split.deadwood, 4);
        assert_eq!(split.unmelded, hand("4c"));
        assert_eq!(
            split.melds,
            vec![meld("Ac Ad Ah"), meld("2d 2h 2s"), meld("3c 3d 3h")]
        );
    }

    #[test]
    fn perfect_gin_melds_everything() {
        let split = split_melds(&hand("2c 3c 4c 5c 6h 6d 6s 9h 9d 9s"), None).unwrap();
        assert_eq!(split.deadwood, 0);
        assert!(split.unmelded.is_empty());
        assert_eq!(
            split.melds,
            vec![meld("2c 3c 4c 5c"), meld("6d 6h 6s"), meld("9d 9h 9s")]
        );
    }

    #[test]
    fn ace_high_run_is_found() {
        let split = split_melds(&hand("Qs Ks As 2h 3h 4h 7c 7d 7h 9c"), None).unwrap();
        assert_eq!(split.deadwood, 9);
        assert_eq!(split.unmelded, hand("9c"));
        assert_eq!(
            split.melds,
            vec![meld("Qs Ks As"), meld("2h 3h 4h"), meld("7c 7d 7h")]
        );
        // the ace presents after the king
        assert_eq!(split.melds[0].cards(), hand("Qs Ks As").as_slice());
    }

    #[test]
    fn ace_wraps_one_end_only() {
        assert!(Meld::new(hand("As 2s 3s")).is_ok());
        assert!(Meld::new(hand("Qs Ks As")).is_ok());
        assert!(matches!(
            Meld::new(hand("Ks As 2s")),
            Err(GinError::InvalidMeld(_))
        ));
    }

    #[test]
    fn meld_validation_rejects_junk() {
        assert!(matches!(
            Meld::new(hand("7c 7d")),
            Err(GinError::InvalidMeld(_))
        ));
        assert!(matches!(
            Meld::new(hand("7c 7d 8h")),
            Err(GinError::InvalidMeld(_))
        ));
        assert!(matches!(
            Meld::new(hand("7c 7c 7d")),
            Err(GinError::InvalidMeld(_))
        ));
        assert!(Meld::new(hand("7c 7d 7h 7s")).is_ok());
        assert!(Meld::new(hand("2c 3c 4c 5c 6c")).is_ok());
    }

    #[test]
    fn four_of_a_kind_also_offers_its_subsets() {
        let sets = find_sets(&hand("7c 7d 7h 7s 2c"));
        assert_eq!(sets.len(), 5);
        assert_eq!(sets.iter().filter(|m| m.len() == 4).count(), 1);
        assert_eq!(sets.iter().filter(|m| m.len() == 3).count(), 4);
    }

    #[test]
    fn runs_enumerate_every_window() {
        let runs = find_runs(&hand("2c 3c 4c 5c 9h"));
        // 2-3-4, 3-4-5, 2-3-4-5
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|m| m.kind() == MeldKind::Run));
    }

    #[test]
    fn degenerate_hand_stays_whole() {
        let split = split_melds(&hand("2c 5d 8h Js Kc"), None).unwrap();
        assert_eq!(split.deadwood, 2 + 5 + 8 + 10 + 10);
        assert!(split.melds.is_empty());
        assert_eq!(split.unmelded.len(), 5);
    }

    #[test]
    fn chosen_melds_are_honored_without_searching() {
        let cards = hand("2c 3c 4c 5c 6h 6d 6s 9h 9d 9s");
        let chosen = vec![meld("6d 6h 6s")];
        let split = split_melds(&cards, Some(&chosen)).unwrap();
        assert_eq!(split.deadwood, 2 + 3 + 4 + 5 + 9 + 9 + 9);
        assert_eq!(split.melds, chosen);
    }

    #[test]
    fn chosen_melds_must_come_from_the_hand() {
        let cards = hand("2c 3c 4c 5c 6h 6d 6s 9h 9d 9s");
        let foreign = vec![meld("Jc Jd Jh")];
        assert!(matches!(
            split_melds(&cards, Some(&foreign)),
            Err(GinError::InvalidMeld(_))
        ));
        let overlapping = vec![meld("2c 3c 4c"), meld("2c 3c 4c 5c")];
        assert!(matches!(
            split_melds(&cards, Some(&overlapping)),
            Err(GinError::InvalidMeld(_))
        ));
    }

    #[test]
    fn malformed_hands_are_rejected() {
        assert!(matches!(
            split_melds(&[], None),
            Err(GinError::MalformedHand(_))
        ));
        assert!(matches!(
            split_melds(&hand("2c 2c 3c"), None),
            Err(GinError::MalformedHand(_))
        ));
        let twelve = hand("2c 3c 4c 5c 6c 7c 8c 9c Tc Jc Qc Kc");
        assert!(matches!(
            split_melds(&twelve, None),
            Err(GinError::MalformedHand(_))
        ));
    }

    #[test]
    fn candidate_melds_respect_the_ceiling() {
        let cards = hand("Ac Ad Ah 2s 2d 2h 3c 3d 3h 4c");
        let candidates = candidate_melds(&cards, Some(10), false).unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.deadwood <= 10));
        assert_eq!(candidates[0].deadwood, 4);
    }

    #[test]
    fn candidates_come_back_best_first() {
        let cards = hand("Qs Ks As 2h 3h 4h 7c 7d 7h 9c");
        let candidates = candidate_melds(&cards, None, false).unwrap();
        let min = candidates.iter().map(|c| c.deadwood).min().unwrap();
        assert_eq!(candidates[0].deadwood, min);
        assert!(candidates
            .windows(2)
            .all(|w| selection_key(&w[0]) <= selection_key(&w[1])));
    }

    #[test]
    fn split_covers_the_hand_exactly() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let cards: Vec<Card> = shuffled_deck(&mut rng)[..10].to_vec();
            let split = split_melds(&cards, None).unwrap();

            let mut rebuilt: Vec<Card> = split
                .melds
                .iter()
                .flat_map(|m| m.cards().iter().copied())
                .chain(split.unmelded.iter().copied())
                .collect();
            rebuilt.sort();
            let mut sorted = cards.clone();
            sorted.sort();
            assert_eq!(rebuilt, sorted);

            assert_eq!(split.deadwood, deadwood_value(&split.unmelded));
            assert!(split.deadwood <= deadwood_value(&cards));
            assert!(split.melds.iter().all(|m| m.len() >= 3));
            let total: usize = split.melds.iter().map(Meld::len).sum();
            let melded = cards_mask(
                &split
                    .melds
                    .iter()
                    .flat_map(|m| m.cards().iter().copied())
                    .collect::<Vec<_>>(),
            );
            assert_eq!(melded.count_ones() as usize, total);
        }
    }

    #[test]
    fn solver_output_is_stable() {
        let cards = hand("Qs Ks As 2h 3h 4h 7c 7d 7h 9c");
        assert_eq!(
            split_melds(&cards, None).unwrap(),
            split_melds(&cards, None).unwrap()
        );
    }

    #[test]
    fn arrange_puts_melds_first() {
        let arranged = arrange_hand(&hand("9s 2c 9d 3c 6h 4c 6d 5c 9h 6s")).unwrap();
        assert_eq!(arranged, hand("2c 3c 4c 5c 6d 6h 6s 9d 9h 9s"));
    }

    #[test]
    fn melds_serialize_as_card_lists() {
        let split = split_melds(&hand("2c 3c 4c 5c 6h 6d 6s 9h 9d 9s"), None).unwrap();
        let json = serde_json::to_value(&split).unwrap();
        assert_eq!(json["deadwood"], 0);
        assert_eq!(json["melds"][0][0], "2c");
        let back: Meld = serde_json::from_str(r#"["Qs","Ks","As"]"#).unwrap();
        assert_eq!(back, meld("Qs Ks As"));
        assert!(serde_json::from_str::<Meld>(r#"["Qs","Ks"]"#).is_err());
    }

    #[test]
    fn eleven_card_hands_are_searched_too() {
        let cards = cards_from_strings(&[
            "2c", "3c", "4c", "5c", "6c", "6d", "6h", "6s", "9h", "9d", "9s",
        ])
        .unwrap();
        let split = split_melds(&cards, None).unwrap();
        assert_eq!(split.deadwood, 0);
    }
}
