pub mod rollout;
pub mod simulation;
mod statearray;
pub mod strategy;

use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};
use strum_macros::{Display, EnumIter};
use thiserror::Error;

pub use simulation::shoe::ShoeError;
use simulation::shoe::reload_index;
pub use statearray::{
    Accumulator, DealerBucket, PlayerBucket, ResultsTable, ACE_PAIR_BUCKET, DEALER_BUCKETS,
    PLAYER_BUCKETS,
};

/// Cards that must remain in the shoe past the reload point, so that a round
/// started just before it never runs off the end.
pub const ROUND_RESERVE: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rule {
    pub number_of_decks: u8,
    /// Fraction of the shoe consumed after which the master cursor reloads.
    pub penetration: f64,
    pub soft17_policy: Soft17Policy,
    pub payout_blackjack: f64,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            number_of_decks: 6,
            penetration: 0.7,
            soft17_policy: Soft17Policy::Hit,
            payout_blackjack: 1.5,
        }
    }
}

impl Rule {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.number_of_decks == 0 {
            return Err(SimulationError::InvalidRule(String::from(
                "number_of_decks must be at least 1",
            )));
        }
        if !(self.penetration > 0.0 && self.penetration < 1.0) {
            return Err(SimulationError::InvalidRule(format!(
                "penetration must be in (0, 1), got {}",
                self.penetration
            )));
        }
        let cards = self.number_of_decks as usize * 52;
        let left = cards - reload_index(self.number_of_decks, self.penetration);
        if left < ROUND_RESERVE {
            return Err(SimulationError::InvalidRule(format!(
                "penetration {} leaves {} cards after the reload point, at least {} are needed",
                self.penetration, left, ROUND_RESERVE
            )));
        }
        if !self.payout_blackjack.is_finite() || self.payout_blackjack < 0.0 {
            return Err(SimulationError::InvalidRule(format!(
                "payout_blackjack must be a non-negative number, got {}",
                self.payout_blackjack
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize_enum_str, Deserialize_enum_str)]
pub enum Soft17Policy {
    Hit,
    Stand,
}

/// The four player decisions, in the order used for tie breaks and table layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum Action {
    #[default]
    Stand,
    Hit,
    Double,
    Split,
}

pub const NUMBER_OF_ACTIONS: usize = 4;

impl Action {
    pub fn index(self) -> usize {
        self as usize
    }

    /// Single-letter code used by action charts.
    pub fn to_char(self) -> char {
        match self {
            Action::Stand => 's',
            Action::Hit => 'h',
            Action::Double => 'd',
            Action::Split => 'p',
        }
    }

    pub fn from_char(c: char) -> Option<Action> {
        match c {
            's' => Some(Action::Stand),
            'h' => Some(Action::Hit),
            'd' => Some(Action::Double),
            'p' => Some(Action::Split),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{action} is not legal for hand {hand}")]
    Illegal { action: Action, hand: String },
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Shoe(#[from] ShoeError),
}
