//! Gin Rummy core engine.
//!
//! The solver half ([`split_melds`], [`candidate_melds`], [`layoff_deadwood`])
//! partitions hands into deadwood-minimal melds and computes post-knock
//! layoffs; the game half ([`GinRummyGameState`]) enforces the full turn
//! structure of two-player Gin Rummy, from the opening upcard offer through
//! knocks, gins, undercuts and the wall.
//!
//! The engine owns no I/O: randomness is injected through [`rand::Rng`] at
//! the shuffle and deal entry points, and every fallible operation returns a
//! [`GinError`].

mod cards;
mod deck;
mod error;
mod game;
mod layoff;
mod meld;

pub use cards::{cards_from_strings, cards_to_strings, Card, Rank, Suit, DECK_SIZE, HAND_SIZE};
pub use deck::{ordered_deck, shuffled_deck, GinCards};
pub use error::GinError;
pub use game::{
    GameConfig, GinAction, GinEnding, GinHud, GinRummyGameState, GinTurn, Player,
};
pub use layoff::{layoff_deadwood, LayoffResult};
pub use meld::{
    arrange_hand, candidate_melds, deadwood_value, split_melds, Meld, MeldKind, SplitHand,
};
