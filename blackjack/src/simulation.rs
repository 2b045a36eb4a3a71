pub mod hand;
pub mod shoe;

use crate::{
    rollout::{self, apply_action, resolve_to_terminal, settle_naturals},
    strategy::{ActionChart, GreedyStrategy, Strategy},
    Action, DealerBucket, PlayerBucket, ResultsTable, Rule, SimulationError,
};
use log::{debug, info, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use self::{
    hand::{DealerHand, PlayerHand},
    shoe::{CardSource, MasterCursor, Shoe},
};

static FACES: [Face; 13] = [
    Face::Ace,
    Face::Two,
    Face::Three,
    Face::Four,
    Face::Five,
    Face::Six,
    Face::Seven,
    Face::Eight,
    Face::Nine,
    Face::Ten,
    Face::Jack,
    Face::Queen,
    Face::King,
];
static SUITS: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Club, Suit::Diamond];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Face {
    Ace = 0,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Face {
    /// Ace counts 11 here; hands lower it to 1 when they would bust.
    pub fn blackjack_value(self) -> u8 {
        match self {
            Face::Ace => 11,
            Face::Ten | Face::Jack | Face::Queen | Face::King => 10,
            face => face as u8 + 1,
        }
    }

    fn symbol(self) -> char {
        match self {
            Face::Ace => 'A',
            Face::Two => '2',
            Face::Three => '3',
            Face::Four => '4',
            Face::Five => '5',
            Face::Six => '6',
            Face::Seven => '7',
            Face::Eight => '8',
            Face::Nine => '9',
            Face::Ten => 'T',
            Face::Jack => 'J',
            Face::Queen => 'Q',
            Face::King => 'K',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Suit {
    Spade = 0,
    Heart,
    Club,
    Diamond,
}

/// Represents a card in the real world. The raw index is in `[0, 52)`:
/// `face = raw % 13`, `suit = raw / 13`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    raw: u8,
}

impl Card {
    pub fn new(face: Face, suit: Suit) -> Card {
        Card {
            raw: suit as u8 * 13 + face as u8,
        }
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn face(&self) -> Face {
        FACES[(self.raw % 13) as usize]
    }

    pub fn suit(&self) -> Suit {
        SUITS[(self.raw / 13) as usize]
    }

    pub fn value(&self) -> u8 {
        self.face().blackjack_value()
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suit = match self.suit() {
            Suit::Spade => 'S',
            Suit::Heart => 'H',
            Suit::Club => 'C',
            Suit::Diamond => 'D',
        };
        write!(f, "{}{}", self.face().symbol(), suit)
    }
}

impl From<Card> for u8 {
    fn from(card: Card) -> u8 {
        card.raw
    }
}

impl TryFrom<u8> for Card {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value >= 52 {
            Err(())
        } else {
            Ok(Card { raw: value })
        }
    }
}

/// Index of a player in the simulator's registry. Sub-hands carry one of these
/// instead of a reference to their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    name: String,
    money: f64,
    hands: u64,
}

impl Player {
    pub fn new(name: &str, initial_money: f64) -> Player {
        Player {
            name: String::from(name),
            money: initial_money,
            hands: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn money(&self) -> f64 {
        self.money
    }

    pub fn hands(&self) -> u64 {
        self.hands
    }

    /// Average money won per hand, `None` before the first hand.
    pub fn expected_value(&self) -> Option<f64> {
        if self.hands == 0 {
            None
        } else {
            Some(self.money / self.hands as f64)
        }
    }

    fn payout(&mut self, amount: f64) {
        self.money += amount;
    }

    fn signal_new_hand(&mut self) {
        self.hands += 1;
    }

    fn clear_stats(&mut self) {
        self.money = 0.0;
        self.hands = 0;
    }
}

/// What happened in one learning round.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundSummary {
    /// At least one side had blackjack; the table was not touched.
    Natural { outcome: f64 },
    /// Every legal root action was rolled out and recorded.
    Explored {
        branches: Vec<(Action, f64)>,
        played: Action,
        cards_consumed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    pub rounds: u64,
    pub money: f64,
    pub expected_value: f64,
}

/// Result of [`Simulator::improve_chart`].
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub chart: ActionChart,
    /// Expected value per hand measured for `chart` in its batch.
    pub expected_value: f64,
    /// Number of batches whose candidate became the new best, counting the
    /// first one.
    pub improvements: u64,
}

/// Drives learning rounds over one shared shoe and one results table.
pub struct Simulator {
    rule: Rule,
    master: MasterCursor,
    results: ResultsTable,
    players: Vec<Player>,
    rounds_played: u64,
}

pub const PRIMARY_PLAYER: PlayerId = PlayerId(0);

impl Simulator {
    pub fn new(rule: &Rule, seed: u64) -> Result<Self, SimulationError> {
        rule.validate()?;
        let master = MasterCursor::new(
            rule.number_of_decks,
            rule.penetration,
            StdRng::seed_from_u64(seed),
        );
        Ok(Self {
            rule: *rule,
            master,
            results: ResultsTable::new(),
            players: vec![Player::new("Player 1", 0.0)],
            rounds_played: 0,
        })
    }

    /// Runs `iterations` learning rounds.
    pub fn run<U: SimulatorEventHandler>(
        &mut self,
        iterations: u64,
        handler: &mut U,
    ) -> Result<(), SimulationError> {
        for _ in 0..iterations {
            self.run_round(handler)?;
        }
        debug!(
            "finished {} rounds, {} samples recorded",
            iterations,
            self.results.total_samples()
        );
        Ok(())
    }

    /// Plays one learning round: deals from the master cursor, rolls out every
    /// legal root action on its own forked cursor, records each branch at the
    /// root cell and finally moves the master cursor past the deepest branch.
    pub fn run_round<U: SimulatorEventHandler>(
        &mut self,
        handler: &mut U,
    ) -> Result<RoundSummary, SimulationError> {
        self.rounds_played += 1;
        if self.master.reload_if_necessary() {
            handler.on_reload(self.master.shoe());
        }
        handler.on_round_begin(self.rounds_played, self.master.offset());

        let (player_hand, dealer_hand) = self.deal_initial_cards();
        handler.on_deal_cards(&player_hand, &dealer_hand);
        self.players[PRIMARY_PLAYER.0].signal_new_hand();

        if let Some(outcome) = settle_naturals(player_hand.primary(), &dealer_hand, &self.rule) {
            self.payout(player_hand.primary().owner(), outcome);
            handler.on_natural(outcome);
            let summary = RoundSummary::Natural { outcome };
            handler.on_round_end(&summary);
            return Ok(summary);
        }

        let dealer_bucket = DealerBucket::of(&dealer_hand);
        let player_bucket = PlayerBucket::of(player_hand.primary());
        let played = self
            .results
            .select_best_action(dealer_bucket, player_hand.primary());

        let start = self.master.offset();
        let mut deepest = start;
        let mut branches = Vec::with_capacity(4);
        for action in Action::iter().filter(|a| player_hand.primary().is_legal(*a)) {
            let mut cursor = self.master.fork();
            let mut branch_player = player_hand.clone();
            let mut branch_dealer = dealer_hand.clone();

            apply_action(&mut branch_player, 0, action, &mut cursor)?;
            let outcome = {
                let mut strategy = GreedyStrategy::new(&self.results);
                resolve_to_terminal(
                    &mut branch_dealer,
                    &mut branch_player,
                    &mut strategy,
                    &mut cursor,
                    &self.rule,
                    action,
                )?
            };
            self.results
                .record_result(dealer_bucket, player_bucket, action, outcome);
            trace!(
                "branch {} from {} vs {}: {:+} ({} cards)",
                action,
                player_hand.primary(),
                dealer_hand,
                outcome,
                cursor.offset() - start
            );
            handler.on_branch_resolved(action, &branch_player, &branch_dealer, outcome);

            deepest = deepest.max(cursor.offset());
            branches.push((action, outcome));
        }
        self.master.advance_to(deepest);

        if let Some((_, outcome)) = branches.iter().find(|(action, _)| *action == played) {
            self.payout(player_hand.primary().owner(), *outcome);
        }

        let summary = RoundSummary::Explored {
            branches,
            played,
            cards_consumed: deepest - start,
        };
        handler.on_round_end(&summary);
        Ok(summary)
    }

    /// Plays `rounds` plain rounds with a fixed strategy, dealing straight from
    /// the master cursor. The results table is left untouched; the player's
    /// stats are cleared first.
    pub fn evaluate<S: Strategy, U: SimulatorEventHandler>(
        &mut self,
        strategy: &mut S,
        rounds: u64,
        handler: &mut U,
    ) -> Result<EvaluationSummary, SimulationError> {
        self.clear_stats();
        for round in 1..=rounds {
            if self.master.reload_if_necessary() {
                handler.on_reload(self.master.shoe());
            }
            handler.on_round_begin(round, self.master.offset());

            let (mut player_hand, mut dealer_hand) = self.deal_initial_cards();
            handler.on_deal_cards(&player_hand, &dealer_hand);
            self.players[PRIMARY_PLAYER.0].signal_new_hand();

            if let Some(outcome) =
                settle_naturals(player_hand.primary(), &dealer_hand, &self.rule)
            {
                self.payout(player_hand.primary().owner(), outcome);
                handler.on_natural(outcome);
                handler.on_round_end(&RoundSummary::Natural { outcome });
                continue;
            }

            let start = self.master.offset();
            let dealer_bucket = DealerBucket::of(&dealer_hand);
            let action =
                rollout::choose_legal_action(strategy, dealer_bucket, player_hand.primary());
            apply_action(&mut player_hand, 0, action, &mut self.master)?;
            let outcome = resolve_to_terminal(
                &mut dealer_hand,
                &mut player_hand,
                strategy,
                &mut self.master,
                &self.rule,
                action,
            )?;
            let rule = self.rule;
            for (owner, amount) in rollout::settle_hands(&player_hand, &dealer_hand, &rule) {
                self.payout(owner, amount);
            }
            handler.on_branch_resolved(action, &player_hand, &dealer_hand, outcome);
            handler.on_round_end(&RoundSummary::Explored {
                branches: vec![(action, outcome)],
                played: action,
                cards_consumed: self.master.offset() - start,
            });
        }

        let player = &self.players[PRIMARY_PLAYER.0];
        Ok(EvaluationSummary {
            rounds,
            money: player.money(),
            expected_value: player.expected_value().unwrap_or(0.0),
        })
    }

    /// Random local search over charts. Every batch evaluates a candidate for
    /// `rounds` rounds with fresh player stats; the first candidate is `start`
    /// itself, later ones are the best chart so far with `adjust` cells
    /// redrawn. A candidate replaces the best one only if its expected value
    /// per hand is strictly higher.
    pub fn improve_chart<R: Rng + ?Sized, U: SimulatorEventHandler>(
        &mut self,
        start: ActionChart,
        batches: u64,
        rounds: u64,
        adjust: usize,
        rng: &mut R,
        handler: &mut U,
    ) -> Result<SearchSummary, SimulationError> {
        let mut best = start;
        let mut best_expected_value = f64::NEG_INFINITY;
        let mut improvements = 0;

        for batch in 0..batches {
            let mut candidate = best.clone();
            if batch > 0 {
                candidate.perturb(adjust, rng);
            }
            let summary = self.evaluate(&mut candidate, rounds, handler)?;
            debug!(
                "search batch {}: expected value {:.4}",
                batch, summary.expected_value
            );
            if summary.expected_value > best_expected_value {
                info!(
                    "best expected value (batch {}): {:.4}",
                    batch, summary.expected_value
                );
                best = candidate;
                best_expected_value = summary.expected_value;
                improvements += 1;
            }
        }

        Ok(SearchSummary {
            chart: best,
            expected_value: best_expected_value,
            improvements,
        })
    }

    pub fn results(&self) -> &ResultsTable {
        &self.results
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.0]
    }

    pub fn rounds_played(&self) -> u64 {
        self.rounds_played
    }

    pub fn master(&self) -> &MasterCursor {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut MasterCursor {
        &mut self.master
    }

    /// Resets every player's money and hand counter.
    pub fn clear_stats(&mut self) {
        for player in self.players.iter_mut() {
            player.clear_stats();
        }
    }

    /// Deals player, dealer, player, dealer from the master cursor.
    fn deal_initial_cards(&mut self) -> (PlayerHand, DealerHand) {
        let mut player_hand = PlayerHand::new(PRIMARY_PLAYER);
        let mut dealer_hand = DealerHand::new();
        for _ in 0..2 {
            player_hand.primary_mut().receive_card(self.master.deal());
            dealer_hand.receive_card(self.master.deal());
        }
        (player_hand, dealer_hand)
    }

    fn payout(&mut self, owner: PlayerId, amount: f64) {
        self.players[owner.0].payout(amount);
    }
}

/// Debug sink for the simulator. Every method defaults to doing nothing.
pub trait SimulatorEventHandler {
    fn on_round_begin(&mut self, _round: u64, _shoe_offset: usize) {}
    fn on_reload(&mut self, _shoe: &Shoe) {}
    fn on_deal_cards(&mut self, _player_hand: &PlayerHand, _dealer_hand: &DealerHand) {}
    fn on_natural(&mut self, _outcome: f64) {}
    fn on_branch_resolved(
        &mut self,
        _action: Action,
        _player_hand: &PlayerHand,
        _dealer_hand: &DealerHand,
        _outcome: f64,
    ) {
    }
    fn on_round_end(&mut self, _summary: &RoundSummary) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl SimulatorEventHandler for NoopHandler {}
