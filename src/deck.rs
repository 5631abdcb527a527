use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank, Suit, DECK_SIZE};

pub fn ordered_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for &suit in Suit::ALL.iter() {
        for &rank in Rank::ALL.iter() {
            deck.push(Card::new(rank, suit));
        }
    }
    deck
}

pub fn shuffled_deck<R: Rng>(rng: &mut R) -> Vec<Card> {
    let mut deck = ordered_deck();
    deck.shuffle(rng);
    deck
}

/// The full 52-card partition of a hand in progress: both hands, the discard
/// pile (topped at the back), and the stock (drawn from the front).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GinCards {
    pub player1_hand: Vec<Card>,
    pub player2_hand: Vec<Card>,
    pub discard_pile: Vec<Card>,
    pub deck: VecDeque<Card>,
}

impl GinCards {
    /// Deal a fresh game: `n` cards each (player 1 first), one card face up
    /// on the discard pile, the rest as stock.
    pub fn deal<R: Rng>(n: usize, rng: &mut R) -> Self {
        assert!(2 * n + 1 <= DECK_SIZE, "cannot deal {n} cards per hand");
        let mut deck = shuffled_deck(rng);
        let rest = deck.split_off(2 * n + 1);
        let discard = deck.split_off(2 * n);
        let player2 = deck.split_off(n);
        Self {
            player1_hand: deck,
            player2_hand: player2,
            discard_pile: discard,
            deck: rest.into(),
        }
    }

    /// True when the four components are disjoint and cover all 52 cards.
    pub fn is_full_partition(&self) -> bool {
        let mut seen = 0u64;
        let mut count = 0usize;
        let piles = [
            self.player1_hand.as_slice(),
            self.player2_hand.as_slice(),
            self.discard_pile.as_slice(),
        ];
        for card in piles.into_iter().flatten().chain(self.deck.iter()) {
            seen |= 1 << card.id();
            count += 1;
        }
        count == DECK_SIZE && seen.count_ones() as usize == DECK_SIZE
    }
}
