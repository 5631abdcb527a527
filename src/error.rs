use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GinError {
    #[error("invalid card code '{0}'")]
    InvalidCardCode(String),
    #[error("invalid card id {0}")]
    InvalidCardId(usize),
    #[error("invalid rank '{0}'")]
    InvalidRank(char),
    #[error("invalid suit '{0}'")]
    InvalidSuit(char),
    #[error("malformed hand: {0}")]
    MalformedHand(String),
    #[error("invalid meld: {0}")]
    InvalidMeld(String),
    #[error("illegal action: {0}")]
    IllegalAction(String),
    #[error("the game is already complete")]
    GameAlreadyComplete,
}
