use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::deck::{ordered_deck, GinCards};
use crate::error::GinError;
use crate::layoff::layoff_deadwood;
use crate::meld::{split_melds, Meld};

/// Knocking is legal at ten or less deadwood after the discard.
const KNOCK_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Player {
    P1,
    P2,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Player::P1 => Player::P2,
            Player::P2 => Player::P1,
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::P1 => write!(f, "P1"),
            Player::P2 => write!(f, "P2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GinTurn {
    P1DrawsFirst,
    P2DrawsFirst,
    P1DrawsFromDeck,
    P2DrawsFromDeck,
    P1Draws,
    P2Draws,
    P1Discards,
    P2Discards,
    P1MayKnock,
    P2MayKnock,
}

impl GinTurn {
    pub fn player(self) -> Player {
        match self {
            GinTurn::P1DrawsFirst
            | GinTurn::P1DrawsFromDeck
            | GinTurn::P1Draws
            | GinTurn::P1Discards
            | GinTurn::P1MayKnock => Player::P1,
            GinTurn::P2DrawsFirst
            | GinTurn::P2DrawsFromDeck
            | GinTurn::P2Draws
            | GinTurn::P2Discards
            | GinTurn::P2MayKnock => Player::P2,
        }
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            GinTurn::P1DrawsFirst
                | GinTurn::P2DrawsFirst
                | GinTurn::P1DrawsFromDeck
                | GinTurn::P2DrawsFromDeck
                | GinTurn::P1Draws
                | GinTurn::P2Draws
        )
    }

    fn allows_discard_pickup(self) -> bool {
        matches!(
            self,
            GinTurn::P1DrawsFirst | GinTurn::P2DrawsFirst | GinTurn::P1Draws | GinTurn::P2Draws
        )
    }

    fn first_draw(player: Player) -> Self {
        match player {
            Player::P1 => GinTurn::P1DrawsFirst,
            Player::P2 => GinTurn::P2DrawsFirst,
        }
    }

    fn deck_draw(player: Player) -> Self {
        match player {
            Player::P1 => GinTurn::P1DrawsFromDeck,
            Player::P2 => GinTurn::P2DrawsFromDeck,
        }
    }

    fn draws(player: Player) -> Self {
        match player {
            Player::P1 => GinTurn::P1Draws,
            Player::P2 => GinTurn::P2Draws,
        }
    }

    fn discards(player: Player) -> Self {
        match player {
            Player::P1 => GinTurn::P1Discards,
            Player::P2 => GinTurn::P2Discards,
        }
    }

    fn may_knock(player: Player) -> Self {
        match player {
            Player::P1 => GinTurn::P1MayKnock,
            Player::P2 => GinTurn::P2MayKnock,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GinTurn::P1DrawsFirst => "P1_DRAWS_FIRST",
            GinTurn::P2DrawsFirst => "P2_DRAWS_FIRST",
            GinTurn::P1DrawsFromDeck => "P1_DRAWS_FROM_DECK",
            GinTurn::P2DrawsFromDeck => "P2_DRAWS_FROM_DECK",
            GinTurn::P1Draws => "P1_DRAWS",
            GinTurn::P2Draws => "P2_DRAWS",
            GinTurn::P1Discards => "P1_DISCARDS",
            GinTurn::P2Discards => "P2_DISCARDS",
            GinTurn::P1MayKnock => "P1_MAY_KNOCK",
            GinTurn::P2MayKnock => "P2_MAY_KNOCK",
        }
    }
}

impl Display for GinTurn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GinAction {
    Pass,
    Knock,
    DontKnock,
    PickFromDeck,
    PickFromDiscard,
    DiscardCard,
}

impl GinAction {
    pub fn as_str(self) -> &'static str {
        match self {
            GinAction::Pass => "PASS",
            GinAction::Knock => "KNOCK",
            GinAction::DontKnock => "DONT_KNOCK",
            GinAction::PickFromDeck => "PICK_FROM_DECK",
            GinAction::PickFromDiscard => "PICK_FROM_DISCARD",
            GinAction::DiscardCard => "DISCARD_CARD",
        }
    }
}

impl Display for GinAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GinEnding {
    P1Knocks,
    P2Knocks,
    P1Gins,
    P2Gins,
    P1BigGins,
    P2BigGins,
    PlayedToTheWall,
}

impl GinEnding {
    fn gins(player: Player) -> Self {
        match player {
            Player::P1 => GinEnding::P1Gins,
            Player::P2 => GinEnding::P2Gins,
        }
    }

    fn big_gins(player: Player) -> Self {
        match player {
            Player::P1 => GinEnding::P1BigGins,
            Player::P2 => GinEnding::P2BigGins,
        }
    }

    fn knocks(player: Player) -> Self {
        match player {
            Player::P1 => GinEnding::P1Knocks,
            Player::P2 => GinEnding::P2Knocks,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GinEnding::P1Knocks => "P1_KNOCKS",
            GinEnding::P2Knocks => "P2_KNOCKS",
            GinEnding::P1Gins => "P1_GINS",
            GinEnding::P2Gins => "P2_GINS",
            GinEnding::P1BigGins => "P1_BIG_GINS",
            GinEnding::P2BigGins => "P2_BIG_GINS",
            GinEnding::PlayedToTheWall => "PLAYED_TO_THE_WALL",
        }
    }
}

impl Display for GinEnding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-card visibility tag. The public hud stores only PLAYER_1, PLAYER_2,
/// TOP_OF_DISCARD_PILE and IN_DISCARD_PILE; the per-player projection maps
/// those onto USER / OPPONENT / LIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GinHud {
    User,
    Opponent,
    TopOfDiscardPile,
    InDiscardPile,
    Live,
    OpponentSimmed,
    Player1,
    Player2,
    Deck,
}

impl GinHud {
    fn owned_by(player: Player) -> Self {
        match player {
            Player::P1 => GinHud::Player1,
            Player::P2 => GinHud::Player2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GinHud::User => "USER",
            GinHud::Opponent => "OPPONENT",
            GinHud::TopOfDiscardPile => "TOP_OF_DISCARD_PILE",
            GinHud::InDiscardPile => "IN_DISCARD_PILE",
            GinHud::Live => "LIVE",
            GinHud::OpponentSimmed => "OPPONENT_SIMMED",
            GinHud::Player1 => "PLAYER_1",
            GinHud::Player2 => "PLAYER_2",
            GinHud::Deck => "DECK",
        }
    }
}

impl Display for GinHud {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule constants. `max_turns` is a safety bound counted in discards, not a
/// rule of the game; `cards_dealt` must not exceed ten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub cards_dealt: usize,
    pub end_cards_in_deck: usize,
    pub gin_bonus: u32,
    pub big_gin_bonus: u32,
    pub undercut_bonus: u32,
    pub max_turns: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cards_dealt: 10,
            end_cards_in_deck: 2,
            gin_bonus: 20,
            big_gin_bonus: 30,
            undercut_bonus: 20,
            max_turns: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GinRummyGameState {
    cards: GinCards,
    turn: GinTurn,
    first_turn: GinTurn,
    public_hud: BTreeMap<Card, GinHud>,
    last_draw_from_discard: Option<Card>,
    ending: Option<GinEnding>,
    p1_score: u32,
    p2_score: u32,
    turns_taken: u32,
    config: GameConfig,
}

impl GinRummyGameState {
    pub fn new_game<R: Rng>(rng: &mut R) -> Self {
        Self::new_game_with_config(GameConfig::default(), rng)
    }

    pub fn new_game_with_config<R: Rng>(config: GameConfig, rng: &mut R) -> Self {
        let first = if rng.gen_bool(0.5) {
            Player::P1
        } else {
            Player::P2
        };
        let cards = GinCards::deal(config.cards_dealt, rng);
        let first_turn = GinTurn::first_draw(first);
        Self::build(cards, first_turn, first_turn, config)
    }

    pub fn new(cards: GinCards, first_player: Player) -> Result<Self, GinError> {
        let first_turn = GinTurn::first_draw(first_player);
        Self::from_parts(cards, first_turn, first_turn, GameConfig::default())
    }

    /// Reconstruct a state mid-hand, e.g. for analysis of a known position.
    pub fn from_parts(
        cards: GinCards,
        turn: GinTurn,
        first_turn: GinTurn,
        config: GameConfig,
    ) -> Result<Self, GinError> {
        if !cards.is_full_partition() {
            return Err(GinError::MalformedHand(
                "cards must partition the 52-card deck".into(),
            ));
        }
        if !matches!(first_turn, GinTurn::P1DrawsFirst | GinTurn::P2DrawsFirst) {
            return Err(GinError::IllegalAction(format!(
                "{first_turn} cannot be the first turn"
            )));
        }
        Ok(Self::build(cards, turn, first_turn, config))
    }

    fn build(cards: GinCards, turn: GinTurn, first_turn: GinTurn, config: GameConfig) -> Self {
        let mut public_hud = BTreeMap::new();
        for (i, &card) in cards.discard_pile.iter().enumerate() {
            let tag = if i + 1 == cards.discard_pile.len() {
                GinHud::TopOfDiscardPile
            } else {
                GinHud::InDiscardPile
            };
            public_hud.insert(card, tag);
        }
        Self {
            cards,
            turn,
            first_turn,
            public_hud,
            last_draw_from_discard: None,
            ending: None,
            p1_score: 0,
            p2_score: 0,
            turns_taken: 0,
            config,
        }
    }

    pub fn do_action(&mut self, action: GinAction, card: Option<Card>) -> Result<(), GinError> {
        match action {
            GinAction::Pass => self.first_turn_pass(),
            GinAction::PickFromDeck => self.draw_card(false).map(|_| ()),
            GinAction::PickFromDiscard => self.draw_card(true).map(|_| ()),
            GinAction::DiscardCard => {
                let card = card.ok_or_else(|| {
                    GinError::IllegalAction("DISCARD_CARD requires a card".into())
                })?;
                self.discard_card(card)
            }
            GinAction::Knock => self.decide_knock(true, None),
            GinAction::DontKnock => self.decide_knock(false, None),
        }
    }

    /// Decline the face-up card on the opening turn. Once both players have
    /// passed, the original first player must draw from the stock.
    pub fn first_turn_pass(&mut self) -> Result<(), GinError> {
        self.ensure_active()?;
        if !matches!(self.turn, GinTurn::P1DrawsFirst | GinTurn::P2DrawsFirst) {
            return Err(GinError::IllegalAction(format!(
                "cannot pass during {}",
                self.turn
            )));
        }
        let opponent = self.turn.player().other();
        self.turn = if GinTurn::first_draw(opponent) == self.first_turn {
            GinTurn::deck_draw(opponent)
        } else {
            GinTurn::first_draw(opponent)
        };
        Ok(())
    }

    pub fn draw_card(&mut self, from_discard: bool) -> Result<Card, GinError> {
        self.ensure_active()?;
        if !self.turn.is_draw() {
            return Err(GinError::IllegalAction(format!(
                "cannot draw during {}",
                self.turn
            )));
        }
        if from_discard && !self.turn.allows_discard_pickup() {
            return Err(GinError::IllegalAction(
                "must draw from the stock after both players passed".into(),
            ));
        }
        let player = self.turn.player();
        if self.hand(player).len() != self.config.cards_dealt {
            return Err(GinError::IllegalAction(format!(
                "{player} cannot draw holding {} cards",
                self.hand(player).len()
            )));
        }

        let card = if from_discard {
            let card = self
                .cards
                .discard_pile
                .pop()
                .ok_or_else(|| GinError::IllegalAction("the discard pile is empty".into()))?;
            // picking up the discard is public information
            self.public_hud.insert(card, GinHud::owned_by(player));
            if let Some(&top) = self.cards.discard_pile.last() {
                self.public_hud.insert(top, GinHud::TopOfDiscardPile);
            }
            self.last_draw_from_discard = Some(card);
            card
        } else {
            let card = self
                .cards
                .deck
                .pop_front()
                .ok_or_else(|| GinError::IllegalAction("the stock is exhausted".into()))?;
            self.last_draw_from_discard = None;
            card
        };
        let hand = self.hand_mut(player);
        hand.push(card);
        hand.sort();

        // an eleven-card hand that melds completely ends the hand at once
        let split = split_melds(self.hand(player), None)?;
        if split.deadwood == 0 {
            let opponent_deadwood = split_melds(self.hand(player.other()), None)?.deadwood;
            let (p1_deadwood, p2_deadwood) = match player {
                Player::P1 => (0, opponent_deadwood),
                Player::P2 => (opponent_deadwood, 0),
            };
            self.end_game(GinEnding::big_gins(player), p1_deadwood, p2_deadwood);
            return Ok(card);
        }

        self.turn = GinTurn::discards(player);
        Ok(card)
    }

    pub fn discard_card(&mut self, card: Card) -> Result<(), GinError> {
        self.ensure_active()?;
        let player = match self.turn {
            GinTurn::P1Discards => Player::P1,
            GinTurn::P2Discards => Player::P2,
            _ => {
                return Err(GinError::IllegalAction(format!(
                    "cannot discard during {}",
                    self.turn
                )))
            }
        };
        if self.hand(player).len() != self.config.cards_dealt + 1 {
            return Err(GinError::IllegalAction(format!(
                "{player} cannot discard holding {} cards",
                self.hand(player).len()
            )));
        }
        let hand = self.hand_mut(player);
        let index = hand
            .iter()
            .position(|&c| c == card)
            .ok_or_else(|| GinError::IllegalAction(format!("{card} is not in {player}'s hand")))?;
        hand.remove(index);

        if let Some(&top) = self.cards.discard_pile.last() {
            self.public_hud.insert(top, GinHud::InDiscardPile);
        }
        self.public_hud.insert(card, GinHud::TopOfDiscardPile);
        self.cards.discard_pile.push(card);
        self.turns_taken += 1;

        let split = split_melds(self.hand(player), None)?;
        if split.deadwood == 0 {
            let opponent_deadwood = split_melds(self.hand(player.other()), None)?.deadwood;
            let (p1_deadwood, p2_deadwood) = match player {
                Player::P1 => (0, opponent_deadwood),
                Player::P2 => (opponent_deadwood, 0),
            };
            self.end_game(GinEnding::gins(player), p1_deadwood, p2_deadwood);
            return Ok(());
        }

        self.turn = if split.deadwood <= KNOCK_LIMIT {
            GinTurn::may_knock(player)
        } else {
            GinTurn::draws(player.other())
        };
        if !matches!(self.turn, GinTurn::P1MayKnock | GinTurn::P2MayKnock) {
            self.end_if_hit_wall();
        }
        Ok(())
    }

    /// Knock (with an optional meld arrangement; the optimal split is used
    /// otherwise) or wave the chance through.
    pub fn decide_knock(&mut self, knocks: bool, melds: Option<Vec<Meld>>) -> Result<(), GinError> {
        self.ensure_active()?;
        let player = match self.turn {
            GinTurn::P1MayKnock => Player::P1,
            GinTurn::P2MayKnock => Player::P2,
            _ => {
                return Err(GinError::IllegalAction(format!(
                    "cannot knock during {}",
                    self.turn
                )))
            }
        };
        if !knocks {
            if !self.end_if_hit_wall() {
                self.turn = GinTurn::draws(player.other());
            }
            return Ok(());
        }

        let split = split_melds(self.hand(player), melds.as_deref())?;
        if split.deadwood > KNOCK_LIMIT {
            return Err(GinError::IllegalAction(format!(
                "cannot knock with {} deadwood",
                split.deadwood
            )));
        }
        let layoff = layoff_deadwood(self.hand(player.other()), &split.melds, true)?;
        let (p1_deadwood, p2_deadwood) = match player {
            Player::P1 => (split.deadwood, layoff.deadwood),
            Player::P2 => (layoff.deadwood, split.deadwood),
        };
        self.end_game(GinEnding::knocks(player), p1_deadwood, p2_deadwood);
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), GinError> {
        if self.ending.is_some() {
            Err(GinError::GameAlreadyComplete)
        } else {
            Ok(())
        }
    }

    fn end_if_hit_wall(&mut self) -> bool {
        if self.cards.deck.len() == self.config.end_cards_in_deck
            || self.turns_taken >= self.config.max_turns
        {
            self.end_game(GinEnding::PlayedToTheWall, 0, 0);
            true
        } else {
            false
        }
    }

    /// Close the hand and award its points to the winner.
    fn end_game(&mut self, how: GinEnding, p1_deadwood: u32, p2_deadwood: u32) {
        let (p1_score, p2_score) = match how {
            GinEnding::PlayedToTheWall => (0, 0),
            GinEnding::P1Gins => (p2_deadwood + self.config.gin_bonus, 0),
            GinEnding::P1BigGins => (p2_deadwood + self.config.big_gin_bonus, 0),
            GinEnding::P2Gins => (0, p1_deadwood + self.config.gin_bonus),
            GinEnding::P2BigGins => (0, p1_deadwood + self.config.big_gin_bonus),
            GinEnding::P1Knocks => {
                if p2_deadwood <= p1_deadwood {
                    // the defender undercuts the knocker
                    (0, p1_deadwood - p2_deadwood + self.config.undercut_bonus)
                } else {
                    (p2_deadwood - p1_deadwood, 0)
                }
            }
            GinEnding::P2Knocks => {
                if p1_deadwood <= p2_deadwood {
                    (p2_deadwood - p1_deadwood + self.config.undercut_bonus, 0)
                } else {
                    (0, p1_deadwood - p2_deadwood)
                }
            }
        };
        self.p1_score = p1_score;
        self.p2_score = p2_score;
        self.ending = Some(how);
    }

    /// Project the 52-card universe through one player's eyes. Cards with no
    /// public fate stay LIVE; opponent-private cards are never revealed.
    pub fn player_hud(&self, viewer: Player) -> BTreeMap<Card, GinHud> {
        let mut hud: BTreeMap<Card, GinHud> = ordered_deck()
            .into_iter()
            .map(|card| (card, GinHud::Live))
            .collect();
        for (&card, &tag) in &self.public_hud {
            let projected = match tag {
                GinHud::TopOfDiscardPile | GinHud::InDiscardPile => tag,
                GinHud::Player1 if viewer == Player::P1 => GinHud::User,
                GinHud::Player2 if viewer == Player::P2 => GinHud::User,
                GinHud::Player1 | GinHud::Player2 => GinHud::Opponent,
                _ => continue,
            };
            hud.insert(card, projected);
        }
        for &card in self.hand(viewer) {
            hud.insert(card, GinHud::User);
        }
        hud
    }

    pub fn hand(&self, player: Player) -> &[Card] {
        match player {
            Player::P1 => &self.cards.player1_hand,
            Player::P2 => &self.cards.player2_hand,
        }
    }

    fn hand_mut(&mut self, player: Player) -> &mut Vec<Card> {
        match player {
            Player::P1 => &mut self.cards.player1_hand,
            Player::P2 => &mut self.cards.player2_hand,
        }
    }

    pub fn turn(&self) -> GinTurn {
        self.turn
    }

    pub fn first_turn(&self) -> GinTurn {
        self.first_turn
    }

    pub fn ending(&self) -> Option<GinEnding> {
        self.ending
    }

    pub fn is_complete(&self) -> bool {
        self.ending.is_some()
    }

    pub fn p1_score(&self) -> u32 {
        self.p1_score
    }

    pub fn p2_score(&self) -> u32 {
        self.p2_score
    }

    pub fn score(&self, player: Player) -> u32 {
        match player {
            Player::P1 => self.p1_score,
            Player::P2 => self.p2_score,
        }
    }

    pub fn top_of_discard(&self) -> Option<Card> {
        self.cards.discard_pile.last().copied()
    }

    pub fn discard_pile(&self) -> &[Card] {
        &self.cards.discard_pile
    }

    pub fn deck_len(&self) -> usize {
        self.cards.deck.len()
    }

    pub fn last_draw_from_discard(&self) -> Option<Card> {
        self.last_draw_from_discard
    }

    pub fn public_hud(&self) -> &BTreeMap<Card, GinHud> {
        &self.public_hud
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn turns_taken(&self) -> u32 {
        self.turns_taken
    }

    /// The raw partition, hands included. This is the omniscient view; use
    /// [`player_hud`](Self::player_hud) for anything player-facing.
    pub fn cards(&self) -> &GinCards {
        &self.cards
    }
}
