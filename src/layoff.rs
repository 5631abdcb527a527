use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::Serialize;

use crate::cards::{Card, Rank, Suit};
use crate::error::GinError;
use crate::meld::{
    candidate_melds, cards_mask, deadwood_value, run_span, value_to_rank, Meld, MeldKind, ACE_HIGH,
    ACE_LOW,
};

/// The defender's position after extending the knocker's melds: what was
/// laid off and what still counts as deadwood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoffResult {
    pub deadwood: u32,
    pub melds: Vec<Meld>,
    pub laid_off: Vec<Card>,
    pub unmelded: Vec<Card>,
}

type RunSpans = BTreeMap<Suit, Vec<(i32, i32)>>;

fn split_sets_runs(melds: &[Meld]) -> Result<(Vec<Rank>, RunSpans), GinError> {
    let mut set_ranks = Vec::new();
    let mut runs: RunSpans = BTreeMap::new();
    for meld in melds {
        match meld.kind() {
            MeldKind::Set => {
                // a four-card set is complete; only three-card sets take layoffs
                if meld.len() == 3 {
                    set_ranks.push(meld.cards()[0].rank);
                }
            }
            MeldKind::Run => {
                let span = run_span(meld.cards())
                    .ok_or_else(|| GinError::InvalidMeld(format!("{meld} is not a run")))?;
                runs.entry(meld.cards()[0].suit).or_default().push(span);
            }
        }
    }
    Ok((set_ranks, runs))
}

fn set_layoffs(unmelded: &[Card], set_ranks: &[Rank]) -> Vec<Card> {
    set_ranks
        .iter()
        .filter_map(|&rank| unmelded.iter().copied().find(|card| card.rank == rank))
        .collect()
}

fn next_low(value: i32) -> Option<Rank> {
    (value > ACE_LOW).then(|| value_to_rank(value - 1)).flatten()
}

fn next_high(value: i32) -> Option<Rank> {
    (value < ACE_HIGH)
        .then(|| value_to_rank(value + 1))
        .flatten()
}

/// Chunks of cards that extend the knocker's runs outward. Each chunk grows
/// from one end of one run and is laid off whole.
fn run_layoffs(unmelded: &[Card], runs: &RunSpans) -> Vec<Vec<Card>> {
    let mut chunks = Vec::new();
    for (&suit, spans) in runs {
        let mut available: BTreeSet<Rank> = unmelded
            .iter()
            .filter(|card| card.suit == suit)
            .map(|card| card.rank)
            .collect();

        for &(low, high) in spans {
            let mut low_value = low;
            let mut chunk = Vec::new();
            while let Some(rank) = next_low(low_value) {
                if !available.remove(&rank) {
                    break;
                }
                chunk.push(Card::new(rank, suit));
                low_value -= 1;
            }
            if !chunk.is_empty() {
                chunks.push(chunk);
            }

            let mut high_value = high;
            let mut chunk = Vec::new();
            while let Some(rank) = next_high(high_value) {
                if !available.remove(&rank) {
                    break;
                }
                chunk.push(Card::new(rank, suit));
                high_value += 1;
            }
            if !chunk.is_empty() {
                chunks.push(chunk);
            }
        }
    }
    chunks
}

/// Best defense against a knock: split the hand, lay unmelded cards onto the
/// knocker's melds, and keep the combination with the least deadwood.
pub fn layoff_deadwood(
    hand: &[Card],
    knocker_melds: &[Meld],
    stop_on_zero: bool,
) -> Result<LayoffResult, GinError> {
    let (set_ranks, runs) = split_sets_runs(knocker_melds)?;

    let mut best: Option<LayoffResult> = None;
    for split in candidate_melds(hand, None, true)? {
        let set_candidates = set_layoffs(&split.unmelded, &set_ranks);
        for chosen_sets in set_candidates.iter().copied().powerset() {
            let set_mask = cards_mask(&chosen_sets);
            let after_sets: Vec<Card> = split
                .unmelded
                .iter()
                .copied()
                .filter(|card| set_mask & (1 << card.id()) == 0)
                .collect();

            for chosen_chunks in run_layoffs(&after_sets, &runs).iter().powerset() {
                let run_cards: Vec<Card> = chosen_chunks
                    .iter()
                    .flat_map(|chunk| chunk.iter().copied())
                    .collect();
                let run_mask = cards_mask(&run_cards);
                let unmelded: Vec<Card> = after_sets
                    .iter()
                    .copied()
                    .filter(|card| run_mask & (1 << card.id()) == 0)
                    .collect();
                let deadwood = deadwood_value(&unmelded);

                if best.as_ref().map_or(true, |b| deadwood < b.deadwood) {
                    let mut laid_off: Vec<Card> =
                        chosen_sets.iter().copied().chain(run_cards).collect();
                    laid_off.sort();
                    let result = LayoffResult {
                        deadwood,
                        melds: split.melds.clone(),
                        laid_off,
                        unmelded,
                    };
                    if stop_on_zero && deadwood == 0 {
                        return Ok(result);
                    }
                    best = Some(result);
                }
            }
        }
    }

    best.ok_or_else(|| GinError::MalformedHand("empty hand".into()))
}
