use std::ops::Index;

use strum::IntoEnumIterator;

use crate::simulation::hand::{DealerHand, PlayerSubHand};
use crate::{Action, NUMBER_OF_ACTIONS};

pub const PLAYER_BUCKETS: usize = 32;
pub const DEALER_BUCKETS: usize = 10;
/// A pair of aces gets the top bucket so it never collides with soft 13 or the
/// other pairs.
pub const ACE_PAIR_BUCKET: u8 = 31;

/// Index of a dealer up-card. Built from the up card's blackjack value, so an
/// ace arrives as 11 and lands in bucket 9; 2 through 10 land in 0 through 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DealerBucket(u8);

impl DealerBucket {
    pub fn new(index: u8) -> DealerBucket {
        debug_assert!((index as usize) < DEALER_BUCKETS);
        DealerBucket(index)
    }

    pub fn from_upcard_value(value: u8) -> DealerBucket {
        debug_assert!((2..=11).contains(&value));
        if value == 11 {
            DealerBucket(9)
        } else {
            DealerBucket(value - 2)
        }
    }

    pub fn of(dealer_hand: &DealerHand) -> DealerBucket {
        Self::from_upcard_value(dealer_hand.showing())
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn iter() -> impl Iterator<Item = DealerBucket> {
        (0..DEALER_BUCKETS as u8).map(DealerBucket)
    }
}

/// Index of a player sub-hand.
///
/// | bucket  | hands                              |
/// |---------|------------------------------------|
/// | 0       | hard 8 or less                     |
/// | 1..=12  | hard 9..=20 (value - 8)            |
/// | 13..=20 | soft 13..=20 (value)               |
/// | 22..=30 | pairs of 2..=10 (20 + pair value)  |
/// | 31      | pair of aces                       |
///
/// Bucket 21 is never used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerBucket(u8);

impl PlayerBucket {
    pub fn new(index: u8) -> PlayerBucket {
        debug_assert!((index as usize) < PLAYER_BUCKETS);
        PlayerBucket(index)
    }

    pub fn of(sub_hand: &PlayerSubHand) -> PlayerBucket {
        let value = sub_hand.value();
        debug_assert!(value < 21, "terminal hands are never bucketed");

        if sub_hand.can_split() {
            let pair_value = sub_hand.cards()[0].value();
            if pair_value == 11 {
                return PlayerBucket(ACE_PAIR_BUCKET);
            }
            return PlayerBucket(20 + pair_value);
        }

        if sub_hand.is_soft() && value >= 13 {
            PlayerBucket(value)
        } else if value <= 8 {
            PlayerBucket(0)
        } else {
            PlayerBucket(value - 8)
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// True for the pair rows, the only ones where splitting can be legal.
    pub fn is_pair(self) -> bool {
        self.0 >= 22
    }

    pub fn iter() -> impl Iterator<Item = PlayerBucket> {
        (0..PLAYER_BUCKETS as u8).map(PlayerBucket)
    }
}

/// Online mean over realized outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    sum: f64,
    count: u64,
}

impl Accumulator {
    pub fn record(&mut self, outcome: f64) {
        self.sum += outcome;
        self.count += 1;
    }

    /// `None` while no outcome has been recorded.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// One accumulator per (player bucket, dealer bucket, action).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsTable {
    cells: Vec<Accumulator>,
}

impl ResultsTable {
    pub fn new() -> ResultsTable {
        ResultsTable {
            cells: vec![Accumulator::default(); PLAYER_BUCKETS * DEALER_BUCKETS * NUMBER_OF_ACTIONS],
        }
    }

    pub fn record_result(
        &mut self,
        dealer: DealerBucket,
        player: PlayerBucket,
        action: Action,
        outcome: f64,
    ) {
        let i = Self::position(player, dealer, action);
        self.cells[i].record(outcome);
    }

    pub fn mean(&self, player: PlayerBucket, dealer: DealerBucket, action: Action) -> Option<f64> {
        self[(player, dealer, action)].mean()
    }

    /// Among the actions accepted by `filter` that have at least one sample,
    /// the one with the highest mean. Earlier actions win ties.
    pub fn best_sampled_action<F>(
        &self,
        player: PlayerBucket,
        dealer: DealerBucket,
        filter: F,
    ) -> Option<Action>
    where
        F: Fn(Action) -> bool,
    {
        let mut best: Option<(Action, f64)> = None;
        for action in Action::iter().filter(|a| filter(*a)) {
            if let Some(mean) = self.mean(player, dealer, action) {
                match best {
                    Some((_, best_mean)) if mean <= best_mean => {}
                    _ => best = Some((action, mean)),
                }
            }
        }
        best.map(|(action, _)| action)
    }

    /// Greedy choice for a live sub-hand: the best sampled legal action, or
    /// `Stand` when none of the legal actions has been sampled yet.
    pub fn select_best_action(&self, dealer: DealerBucket, sub_hand: &PlayerSubHand) -> Action {
        let player = PlayerBucket::of(sub_hand);
        self.best_sampled_action(player, dealer, |action| sub_hand.is_legal(action))
            .unwrap_or_default()
    }

    pub fn total_samples(&self) -> u64 {
        self.cells.iter().map(|cell| cell.count()).sum()
    }

    pub fn clear(&mut self) {
        self.cells.fill(Accumulator::default());
    }

    fn position(player: PlayerBucket, dealer: DealerBucket, action: Action) -> usize {
        (player.index() * DEALER_BUCKETS + dealer.index()) * NUMBER_OF_ACTIONS + action.index()
    }
}

impl Default for ResultsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<(PlayerBucket, DealerBucket, Action)> for ResultsTable {
    type Output = Accumulator;

    fn index(&self, (player, dealer, action): (PlayerBucket, DealerBucket, Action)) -> &Accumulator {
        &self.cells[Self::position(player, dealer, action)]
    }
}
