//! Resolving hands to a final payout.
//!
//! Everything here works on any [`CardSource`], so the same code plays the
//! speculative branches of a learning round on forked cursors and the plain
//! rounds of an evaluation on the master cursor.

use crate::simulation::hand::{DealerHand, Hand, PlayerHand, PlayerSubHand};
use crate::simulation::shoe::CardSource;
use crate::simulation::PlayerId;
use crate::strategy::Strategy;
use crate::{Action, ActionError, DealerBucket, Rule, Soft17Policy};

use log::trace;
use strum::IntoEnumIterator;

/// Payout multiplier of a finished sub-hand against the dealer's final hand,
/// before the bet is applied.
pub fn outcome_multiplier(sub_hand: &PlayerSubHand, dealer: &Hand, rule: &Rule) -> f64 {
    if sub_hand.is_busted() {
        -1.0
    } else if sub_hand.is_blackjack() && dealer.is_blackjack() {
        0.0
    } else if dealer.is_blackjack() {
        -1.0
    } else if sub_hand.is_blackjack() {
        rule.payout_blackjack
    } else if dealer.is_busted() || sub_hand.value() > dealer.value() {
        1.0
    } else if sub_hand.value() == dealer.value() {
        0.0
    } else {
        -1.0
    }
}

pub fn hand_outcome(sub_hand: &PlayerSubHand, dealer: &Hand, rule: &Rule) -> f64 {
    sub_hand.bet() * outcome_multiplier(sub_hand, dealer, rule)
}

/// Settles a freshly dealt round when either side has blackjack. Returns `None`
/// when the round has to be played.
pub fn settle_naturals(primary: &PlayerSubHand, dealer: &DealerHand, rule: &Rule) -> Option<f64> {
    match (primary.is_blackjack(), dealer.is_blackjack()) {
        (false, false) => None,
        _ => Some(hand_outcome(primary, dealer, rule)),
    }
}

/// Outcome of every sub-hand, keyed by its owner.
pub fn settle_hands<'a>(
    player_hand: &'a PlayerHand,
    dealer: &'a DealerHand,
    rule: &'a Rule,
) -> impl Iterator<Item = (PlayerId, f64)> + 'a {
    player_hand
        .sub_hands()
        .iter()
        .map(move |sub_hand| (sub_hand.owner(), hand_outcome(sub_hand, dealer, rule)))
}

pub fn legal_actions(sub_hand: &PlayerSubHand) -> impl Iterator<Item = Action> + '_ {
    Action::iter().filter(move |action| sub_hand.is_legal(*action))
}

/// Applies `action` to the sub-hand at `index`. A split appends the new
/// sub-hand to `player_hand`.
pub fn apply_action<C: CardSource>(
    player_hand: &mut PlayerHand,
    index: usize,
    action: Action,
    source: &mut C,
) -> Result<(), ActionError> {
    match action {
        Action::Stand => player_hand.get_mut(index).stand(),
        Action::Hit => {
            player_hand.get_mut(index).hit(source)?;
        }
        Action::Double => {
            player_hand.get_mut(index).double_down(source)?;
        }
        Action::Split => player_hand.split_sub_hand(index, source)?,
    }
    Ok(())
}

fn fallback(action: Action) -> Action {
    match action {
        Action::Double | Action::Split => Action::Hit,
        Action::Hit | Action::Stand => Action::Stand,
    }
}

/// Asks the strategy for an action and walks the fallback chain
/// (double or split to hit, hit to stand) until the action is legal.
pub fn choose_legal_action<S: Strategy>(
    strategy: &mut S,
    dealer: DealerBucket,
    sub_hand: &PlayerSubHand,
) -> Action {
    let mut action = strategy.make_decision(dealer, sub_hand);
    while !sub_hand.is_legal(action) {
        action = fallback(action);
    }
    action
}

pub fn dealer_must_hit(dealer: &Hand, rule: &Rule) -> bool {
    let value = dealer.value();
    value < 17 || (value == 17 && dealer.is_soft() && rule.soft17_policy == Soft17Policy::Hit)
}

/// Reveals the hole card and draws until the dealer has to stand.
pub fn dealer_plays<C: CardSource>(dealer: &mut DealerHand, rule: &Rule, source: &mut C) {
    dealer.flip_hole_card();
    while dealer_must_hit(dealer, rule) {
        dealer.receive_card(source.deal());
    }
}

/// Plays out a branch whose root action has already been applied to the first
/// sub-hand. Unless the root action was a stand, every sub-hand (including ones
/// appended by splits on the way) is played with `strategy` until it cannot act
/// any more. Then the dealer plays. Returns the summed outcome of all
/// sub-hands.
pub fn resolve_to_terminal<S: Strategy, C: CardSource>(
    dealer: &mut DealerHand,
    player_hand: &mut PlayerHand,
    strategy: &mut S,
    source: &mut C,
    rule: &Rule,
    triggering: Action,
) -> Result<f64, ActionError> {
    if triggering != Action::Stand {
        let dealer_bucket = DealerBucket::of(dealer);
        let mut index = 0;
        while index < player_hand.number_of_sub_hands() {
            while player_hand.get(index).can_act() {
                let action = choose_legal_action(strategy, dealer_bucket, player_hand.get(index));
                trace!("sub-hand {} {}: {}", index, player_hand.get(index), action);
                apply_action(player_hand, index, action, source)?;
                if action == Action::Stand {
                    break;
                }
            }
            index += 1;
        }
    }

    dealer_plays(dealer, rule, source);

    Ok(settle_hands(player_hand, dealer, rule)
        .map(|(_, outcome)| outcome)
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::shoe::MasterCursor;
    use crate::simulation::{Card, Face, Suit};
    use rand::{rngs::StdRng, SeedableRng};

    struct Always(Action);

    impl Strategy for Always {
        fn make_decision(&mut self, _dealer: DealerBucket, _sub_hand: &PlayerSubHand) -> Action {
            self.0
        }
    }

    fn card(face: Face) -> Card {
        Card::new(face, Suit::Spade)
    }

    fn stacked(faces: &[Face]) -> MasterCursor {
        let mut master = MasterCursor::new(1, 0.7, StdRng::seed_from_u64(11));
        master.reload_with_firsts(faces).unwrap();
        master
    }

    /// `hole` first, then the up card.
    fn dealer_of(hole: Face, up: Face) -> DealerHand {
        let mut dealer = DealerHand::new();
        dealer.receive_card(card(hole));
        dealer.receive_card(card(up));
        dealer
    }

    fn player_of(faces: &[Face]) -> PlayerHand {
        let mut player_hand = PlayerHand::new(PlayerId(0));
        for face in faces {
            player_hand.primary_mut().receive_card(card(*face));
        }
        player_hand
    }

    #[test]
    fn dealer_hits_hard_16() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Five]);
        let mut dealer = dealer_of(Face::Ten, Face::Six);
        dealer_plays(&mut dealer, &rule, &mut master);
        assert_eq!(dealer.value(), 21);
        assert_eq!(master.offset(), 1);
        assert!(!dealer.is_hole_card_hidden());
    }

    #[test]
    fn dealer_stands_on_hard_17() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Five]);
        let mut dealer = dealer_of(Face::Ten, Face::Seven);
        dealer_plays(&mut dealer, &rule, &mut master);
        assert_eq!(dealer.value(), 17);
        assert_eq!(master.offset(), 0);
    }

    #[test]
    fn soft_17_follows_the_rule() {
        let soft_17 = dealer_of(Face::Ace, Face::Six);
        assert!(dealer_must_hit(&soft_17, &Rule::default()));

        let mut rule = Rule::default();
        rule.soft17_policy = Soft17Policy::Stand;
        assert!(!dealer_must_hit(&soft_17, &rule));

        let soft_18 = dealer_of(Face::Ace, Face::Seven);
        assert!(!dealer_must_hit(&soft_18, &Rule::default()));
    }

    #[test]
    fn payouts() {
        let rule = Rule::default();
        let dealer_20 = dealer_of(Face::King, Face::Queen);

        let twenty = player_of(&[Face::Ten, Face::Jack]);
        assert_eq!(hand_outcome(twenty.primary(), &dealer_20, &rule), 0.0);

        let nineteen = player_of(&[Face::Ten, Face::Nine]);
        assert_eq!(hand_outcome(nineteen.primary(), &dealer_20, &rule), -1.0);

        let blackjack = player_of(&[Face::Ace, Face::Jack]);
        assert_eq!(hand_outcome(blackjack.primary(), &dealer_20, &rule), 1.5);

        let twenty_one = player_of(&[Face::Five, Face::Six, Face::Queen]);
        assert_eq!(hand_outcome(twenty_one.primary(), &dealer_20, &rule), 1.0);

        let mut dealer_bust = dealer_of(Face::King, Face::Six);
        dealer_bust.receive_card(card(Face::Nine));
        let busted = player_of(&[Face::Ten, Face::Six, Face::Eight]);
        assert_eq!(hand_outcome(busted.primary(), &dealer_bust, &rule), -1.0);
        assert_eq!(hand_outcome(nineteen.primary(), &dealer_bust, &rule), 1.0);
    }

    #[test]
    fn doubled_bet_doubles_the_outcome() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Ten]);
        let mut player_hand = player_of(&[Face::Six, Face::Five]);
        apply_action(&mut player_hand, 0, Action::Double, &mut master).unwrap();
        let dealer = dealer_of(Face::Ten, Face::Eight);
        assert_eq!(hand_outcome(player_hand.primary(), &dealer, &rule), 2.0);
    }

    #[test]
    fn naturals() {
        let rule = Rule::default();
        let nines = player_of(&[Face::Nine, Face::Nine]);
        let blackjack = player_of(&[Face::King, Face::Ace]);
        let dealer_blackjack = dealer_of(Face::King, Face::Ace);
        let dealer_19 = dealer_of(Face::King, Face::Nine);

        assert_eq!(
            settle_naturals(nines.primary(), &dealer_blackjack, &rule),
            Some(-1.0)
        );
        assert_eq!(
            settle_naturals(blackjack.primary(), &dealer_blackjack, &rule),
            Some(0.0)
        );
        assert_eq!(
            settle_naturals(blackjack.primary(), &dealer_19, &rule),
            Some(1.5)
        );
        assert_eq!(settle_naturals(nines.primary(), &dealer_19, &rule), None);
    }

    #[test]
    fn illegal_choices_fall_back() {
        let dealer = DealerBucket::from_upcard_value(10);
        let three_cards = player_of(&[Face::Two, Face::Three, Face::Four]);
        assert_eq!(
            choose_legal_action(&mut Always(Action::Double), dealer, three_cards.primary()),
            Action::Hit
        );
        assert_eq!(
            choose_legal_action(&mut Always(Action::Split), dealer, three_cards.primary()),
            Action::Hit
        );

        let twenty_one = player_of(&[Face::Ten, Face::Four, Face::Seven]);
        assert_eq!(
            choose_legal_action(&mut Always(Action::Double), dealer, twenty_one.primary()),
            Action::Stand
        );
        assert_eq!(legal_actions(twenty_one.primary()).count(), 1);
    }

    #[test]
    fn resolve_keeps_hitting_after_a_hit() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Five, Face::Four]);
        let mut player_hand = player_of(&[Face::Ten, Face::Two]);
        let mut dealer = dealer_of(Face::Ten, Face::Seven);

        apply_action(&mut player_hand, 0, Action::Hit, &mut master).unwrap();
        let outcome = resolve_to_terminal(
            &mut dealer,
            &mut player_hand,
            &mut Always(Action::Hit),
            &mut master,
            &rule,
            Action::Hit,
        )
        .unwrap();

        assert_eq!(player_hand.primary().value(), 21);
        assert_eq!(dealer.value(), 17);
        assert_eq!(outcome, 1.0);
        assert_eq!(master.offset(), 2);
    }

    #[test]
    fn resolve_plays_every_split_hand() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Three, Face::Two]);
        let mut player_hand = player_of(&[Face::Eight, Face::Eight]);
        let mut dealer = dealer_of(Face::Ten, Face::Seven);

        apply_action(&mut player_hand, 0, Action::Split, &mut master).unwrap();
        assert_eq!(player_hand.number_of_sub_hands(), 2);

        let outcome = resolve_to_terminal(
            &mut dealer,
            &mut player_hand,
            &mut Always(Action::Stand),
            &mut master,
            &rule,
            Action::Split,
        )
        .unwrap();

        assert!(player_hand.sub_hands().iter().all(|s| s.is_finished()));
        assert_eq!(player_hand.get(0).value(), 10);
        assert_eq!(player_hand.get(1).value(), 11);
        assert_eq!(outcome, -2.0);
        assert_eq!(master.offset(), 2);
    }

    #[test]
    fn stand_root_skips_the_player() {
        let rule = Rule::default();
        let mut master = stacked(&[Face::Two, Face::Ten]);
        let mut player_hand = player_of(&[Face::Ten, Face::Two]);
        let mut dealer = dealer_of(Face::Ten, Face::Four);

        apply_action(&mut player_hand, 0, Action::Stand, &mut master).unwrap();
        let outcome = resolve_to_terminal(
            &mut dealer,
            &mut player_hand,
            &mut Always(Action::Hit),
            &mut master,
            &rule,
            Action::Stand,
        )
        .unwrap();

        assert_eq!(player_hand.primary().len(), 2);
        assert_eq!(dealer.value(), 26);
        assert_eq!(outcome, 1.0);
    }
}
