use blackjack_rollout::simulation::hand::{DealerHand, PlayerHand};
use blackjack_rollout::simulation::shoe::Shoe;
use blackjack_rollout::simulation::{RoundSummary, SimulatorEventHandler};
use blackjack_rollout::{Action, DealerBucket, PlayerBucket, ResultsTable, Rule};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use strum::IntoEnumIterator;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value in config: {0}")]
    Value(#[from] serde::de::value::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rule: ConfigRule,
    #[serde(default)]
    pub simulator: ConfigSimulator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigRule {
    pub number_of_decks: u8,
    pub penetration: f64,
    pub soft17_policy: String,
    pub payout_blackjack: f64,
}

impl Default for ConfigRule {
    fn default() -> Self {
        let rule = Rule::default();
        ConfigRule {
            number_of_decks: rule.number_of_decks,
            penetration: rule.penetration,
            soft17_policy: rule.soft17_policy.to_string(),
            payout_blackjack: rule.payout_blackjack,
        }
    }
}

impl TryInto<Rule> for ConfigRule {
    type Error = serde::de::value::Error;

    fn try_into(self) -> Result<Rule, Self::Error> {
        let rule = Rule {
            number_of_decks: self.number_of_decks,
            penetration: self.penetration,
            soft17_policy: self.soft17_policy.parse()?,
            payout_blackjack: self.payout_blackjack,
        };

        Ok(rule)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSimulator {
    pub iterations: u64,
    /// Shuffling seed. A time based one is used when absent.
    pub seed: Option<u64>,
    pub progress_interval: u64,
    /// Rounds played with the learned chart after training. 0 skips it.
    pub evaluation_rounds: u64,
    /// Batches of random local search started from the learned chart. 0 skips
    /// the search.
    pub search_batches: u64,
    /// Rounds evaluated per search batch.
    pub search_rounds: u64,
    /// Cells redrawn per search batch.
    pub search_adjust: usize,
}

impl Default for ConfigSimulator {
    fn default() -> Self {
        ConfigSimulator {
            iterations: 1_000_000,
            seed: None,
            progress_interval: 100_000,
            evaluation_rounds: 0,
            search_batches: 0,
            search_rounds: 100_000,
            search_adjust: 5,
        }
    }
}

/// Reads the content of a given config file and parses it to a Config.
/// Missing sections and fields take their defaults.
pub fn parse_config_from_file(filename: &str) -> Result<Config, ConfigError> {
    let file_content = fs::read_to_string(filename)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

/// Writes the mean outcome of every cell: for each player bucket, one line per
/// action with one tab separated field per dealer bucket. Cells without
/// samples are left empty.
pub fn write_results_grid<W: Write>(results: &ResultsTable, mut out: W) -> io::Result<()> {
    for player in PlayerBucket::iter() {
        for action in Action::iter() {
            let fields: Vec<String> = DealerBucket::iter()
                .map(|dealer| match results.mean(player, dealer, action) {
                    Some(mean) => format!("{:.4}", mean),
                    None => String::new(),
                })
                .collect();
            writeln!(out, "{}", fields.join("\t"))?;
        }
    }
    out.flush()
}

/// Reports progress with `log` while the simulator runs.
pub struct LoggingHandler {
    progress_interval: u64,
    total_rounds: u64,
    reloads: u64,
    naturals: u64,
}

impl LoggingHandler {
    pub fn new(progress_interval: u64, total_rounds: u64) -> Self {
        LoggingHandler {
            progress_interval,
            total_rounds,
            reloads: 0,
            naturals: 0,
        }
    }

    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    pub fn naturals(&self) -> u64 {
        self.naturals
    }
}

impl SimulatorEventHandler for LoggingHandler {
    fn on_round_begin(&mut self, round: u64, _shoe_offset: usize) {
        if self.progress_interval > 0 && round % self.progress_interval == 0 {
            info!(
                "round {}/{} ({} reloads, {} naturals)",
                round, self.total_rounds, self.reloads, self.naturals
            );
        }
    }

    fn on_reload(&mut self, shoe: &Shoe) {
        self.reloads += 1;
        debug!("shoe of {} cards reloaded", shoe.len());
    }

    fn on_deal_cards(&mut self, player_hand: &PlayerHand, dealer_hand: &DealerHand) {
        debug!("dealt {} against {}", player_hand, dealer_hand);
    }

    fn on_natural(&mut self, outcome: f64) {
        self.naturals += 1;
        debug!("natural settled at {:+}", outcome);
    }

    fn on_branch_resolved(
        &mut self,
        action: Action,
        player_hand: &PlayerHand,
        dealer_hand: &DealerHand,
        outcome: f64,
    ) {
        debug!(
            "{}: {} against {} ({}) -> {:+}",
            action,
            player_hand,
            dealer_hand,
            dealer_hand.value(),
            outcome
        );
    }

    fn on_round_end(&mut self, summary: &RoundSummary) {
        if let RoundSummary::Explored {
            played,
            cards_consumed,
            ..
        } = summary
        {
            debug!("played {}, {} cards consumed", played, cards_consumed);
        }
    }
}
