use std::fmt::{self, Write};
use std::str::FromStr;

use rand::Rng;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::simulation::hand::PlayerSubHand;
use crate::{Action, DealerBucket, PlayerBucket, ResultsTable, DEALER_BUCKETS, PLAYER_BUCKETS};

/// Picks the next action for a live sub-hand. The rollout engine falls back to
/// a legal action if the returned one is not allowed.
pub trait Strategy {
    fn make_decision(&mut self, dealer: DealerBucket, sub_hand: &PlayerSubHand) -> Action;
}

/// Follows whatever the results table currently prefers.
pub struct GreedyStrategy<'a> {
    results: &'a ResultsTable,
}

impl<'a> GreedyStrategy<'a> {
    pub fn new(results: &'a ResultsTable) -> Self {
        Self { results }
    }
}

impl<'a> Strategy for GreedyStrategy<'a> {
    fn make_decision(&mut self, dealer: DealerBucket, sub_hand: &PlayerSubHand) -> Action {
        self.results.select_best_action(dealer, sub_hand)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ChartParseError {
    #[error("expected {expected} cells, found {found}")]
    WrongLength { expected: usize, found: usize },
    #[error("unknown action {found:?} at cell {position}")]
    UnknownAction { position: usize, found: char },
}

/// A fixed policy: one action per (player bucket, dealer bucket).
///
/// The text form is one character per cell (`s`, `h`, `d` or `p`), row major by
/// player bucket, without separators.
///
/// The chart also counts how often each cell was consulted since it was
/// built or last changed. The counts take no part in equality or in the text
/// form.
#[derive(Debug, Clone)]
pub struct ActionChart {
    cells: [[Action; DEALER_BUCKETS]; PLAYER_BUCKETS],
    usage: [[u64; DEALER_BUCKETS]; PLAYER_BUCKETS],
}

/// A uniformly random action for a cell of the given row. Only pair rows may
/// split.
fn random_action<R: Rng + ?Sized>(player: PlayerBucket, rng: &mut R) -> Action {
    let choices = if player.is_pair() { 4 } else { 3 };
    Action::iter()
        .nth(rng.gen_range(0..choices))
        .unwrap_or_default()
}

impl ActionChart {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> ActionChart {
        let mut chart = ActionChart::default();
        for player in PlayerBucket::iter() {
            for dealer in DealerBucket::iter() {
                chart.cells[player.index()][dealer.index()] = random_action(player, rng);
            }
        }
        chart
    }

    /// Redraws `cells` randomly chosen cells (the same cell may be drawn more
    /// than once) and resets the usage counts.
    pub fn perturb<R: Rng + ?Sized>(&mut self, cells: usize, rng: &mut R) {
        for _ in 0..cells {
            let player = PlayerBucket::new(rng.gen_range(0..PLAYER_BUCKETS) as u8);
            let dealer = DealerBucket::new(rng.gen_range(0..DEALER_BUCKETS) as u8);
            self.cells[player.index()][dealer.index()] = random_action(player, rng);
        }
        self.clear_usage();
    }

    /// Number of decisions taken from this cell.
    pub fn usage(&self, player: PlayerBucket, dealer: DealerBucket) -> u64 {
        self.usage[player.index()][dealer.index()]
    }

    pub fn clear_usage(&mut self) {
        self.usage = [[0; DEALER_BUCKETS]; PLAYER_BUCKETS];
    }

    /// One line per player bucket, each cell rendered as its action code
    /// followed by its usage count, e.g. `h (12)`.
    pub fn usage_table(&self) -> String {
        let mut table = String::new();
        for (actions, counts) in self.cells.iter().zip(self.usage.iter()) {
            let row: Vec<String> = actions
                .iter()
                .zip(counts.iter())
                .map(|(action, count)| format!("{} ({})", action.to_char(), count))
                .collect();
            let _ = writeln!(table, "{}", row.join(" "));
        }
        table
    }

    /// Reads off the best sampled action of every cell, ignoring legality.
    /// Cells without samples get `Stand`.
    pub fn from_results(results: &ResultsTable) -> ActionChart {
        let mut chart = ActionChart::default();
        for player in PlayerBucket::iter() {
            for dealer in DealerBucket::iter() {
                chart.cells[player.index()][dealer.index()] = results
                    .best_sampled_action(player, dealer, |_| true)
                    .unwrap_or_default();
            }
        }
        chart
    }

    pub fn get(&self, player: PlayerBucket, dealer: DealerBucket) -> Action {
        self.cells[player.index()][dealer.index()]
    }

    pub fn set(&mut self, player: PlayerBucket, dealer: DealerBucket, action: Action) {
        self.cells[player.index()][dealer.index()] = action;
    }
}

impl Default for ActionChart {
    fn default() -> Self {
        ActionChart {
            cells: [[Action::Stand; DEALER_BUCKETS]; PLAYER_BUCKETS],
            usage: [[0; DEALER_BUCKETS]; PLAYER_BUCKETS],
        }
    }
}

impl PartialEq for ActionChart {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Strategy for ActionChart {
    fn make_decision(&mut self, dealer: DealerBucket, sub_hand: &PlayerSubHand) -> Action {
        let player = PlayerBucket::of(sub_hand);
        self.usage[player.index()][dealer.index()] += 1;
        self.get(player, dealer)
    }
}

impl fmt::Display for ActionChart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self
            .cells
            .iter()
            .flat_map(|row| row.iter().map(|action| action.to_char()))
            .collect();
        write!(f, "{}", text)
    }
}

impl FromStr for ActionChart {
    type Err = ChartParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let expected = PLAYER_BUCKETS * DEALER_BUCKETS;
        let found = s.chars().count();
        if found != expected {
            return Err(ChartParseError::WrongLength { expected, found });
        }

        let mut chart = ActionChart::default();
        for (position, c) in s.chars().enumerate() {
            let action =
                Action::from_char(c).ok_or(ChartParseError::UnknownAction { position, found: c })?;
            chart.cells[position / DEALER_BUCKETS][position % DEALER_BUCKETS] = action;
        }
        Ok(chart)
    }
}
