use std::fmt;
use std::ops::Deref;

use blackjack_rollout_macros::requires_action;

use super::{shoe::CardSource, Card, Face, PlayerId};
use crate::{Action, ActionError};

/// An ordered run of cards. Every derived quantity is recomputed from the cards
/// on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Hand {
        Hand {
            cards: Vec::with_capacity(4),
        }
    }

    pub fn receive_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn value(&self) -> u8 {
        self.compute_value().0
    }

    /// True if at least one ace still counts as 11.
    pub fn is_soft(&self) -> bool {
        self.compute_value().1
    }

    pub fn is_busted(&self) -> bool {
        self.value() > 21
    }

    pub fn is_blackjack(&self) -> bool {
        self.cards.len() == 2 && self.value() == 21
    }

    /// Cards comma separated. With `hide_first`, the first card is left out.
    pub fn render(&self, hide_first: bool) -> String {
        let skip = if hide_first { 1 } else { 0 };
        self.cards
            .iter()
            .skip(skip)
            .map(|card| card.to_string())
            .collect::<Vec<String>>()
            .join(", ")
    }

    fn compute_value(&self) -> (u8, bool) {
        let mut sum: u16 = 0;
        let mut aces = 0;
        for card in &self.cards {
            sum += card.value() as u16;
            if card.face() == Face::Ace {
                aces += 1;
            }
        }

        while aces > 0 && sum > 21 {
            aces -= 1;
            sum -= 10;
        }

        (sum.min(u8::MAX as u16) as u8, aces > 0)
    }
}

impl fmt::Display for Hand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(false))
    }
}

/// The dealer's cards. The first dealt card is the hole card, the second one
/// is the up card.
#[derive(Debug, Clone, PartialEq)]
pub struct DealerHand {
    hand: Hand,
    hole_card_hidden: bool,
}

impl DealerHand {
    pub fn new() -> DealerHand {
        DealerHand {
            hand: Hand::new(),
            hole_card_hidden: true,
        }
    }

    pub fn receive_card(&mut self, card: Card) {
        self.hand.receive_card(card);
    }

    pub fn up_card(&self) -> Card {
        self.hand.cards[1]
    }

    /// Blackjack value of the up card (an ace shows 11). Concealment does not
    /// change it.
    pub fn showing(&self) -> u8 {
        self.up_card().value()
    }

    pub fn flip_hole_card(&mut self) {
        self.hole_card_hidden = false;
    }

    pub fn is_hole_card_hidden(&self) -> bool {
        self.hole_card_hidden
    }
}

impl Default for DealerHand {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for DealerHand {
    type Target = Hand;

    fn deref(&self) -> &Hand {
        &self.hand
    }
}

impl fmt::Display for DealerHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hand.render(self.hole_card_hidden))
    }
}

/// One of the hands a player controls.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSubHand {
    hand: Hand,
    owner: PlayerId,
    bet: f64,
    from_split: bool,
    finished: bool,
}

impl PlayerSubHand {
    pub fn new(owner: PlayerId) -> PlayerSubHand {
        PlayerSubHand {
            hand: Hand::new(),
            owner,
            bet: 1.0,
            from_split: false,
            finished: false,
        }
    }

    pub fn receive_card(&mut self, card: Card) {
        self.hand.receive_card(card);
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn bet(&self) -> f64 {
        self.bet
    }

    pub fn is_from_split(&self) -> bool {
        self.from_split
    }

    /// True once the hand stood or doubled.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Split aces take exactly one card each.
    pub fn can_hit(&self) -> bool {
        let split_aces = self.from_split && self.hand.cards[0].face() == Face::Ace;
        let cant_hit = self.is_busted() || self.is_blackjack() || split_aces || self.value() >= 21;
        !cant_hit
    }

    /// True while the player still has a decision to make on this hand.
    pub fn can_act(&self) -> bool {
        !self.finished && self.can_hit()
    }

    pub fn can_split(&self) -> bool {
        self.hand.cards.len() == 2 && self.hand.cards[0].face() == self.hand.cards[1].face()
    }

    pub fn can_double_down(&self) -> bool {
        self.hand.cards.len() == 2
    }

    pub fn is_legal(&self, action: Action) -> bool {
        match action {
            Action::Stand => true,
            Action::Hit => self.can_act(),
            Action::Double => self.can_act() && self.can_double_down(),
            Action::Split => self.can_act() && self.can_split(),
        }
    }

    pub fn stand(&mut self) {
        self.finished = true;
    }

    #[requires_action(Hit)]
    pub fn hit<C: CardSource>(&mut self, source: &mut C) -> Result<Card, ActionError> {
        let card = source.deal();
        self.hand.receive_card(card);
        Ok(card)
    }

    /// Doubles the bet and takes exactly one more card; the hand is finished
    /// afterwards.
    #[requires_action(Double)]
    pub fn double_down<C: CardSource>(&mut self, source: &mut C) -> Result<Card, ActionError> {
        self.bet *= 2.0;
        let card = source.deal();
        self.hand.receive_card(card);
        self.finished = true;
        Ok(card)
    }

    /// Moves the second card into a new sub-hand and deals one card to each,
    /// the new sub-hand first. Returns the new sub-hand for the caller to add
    /// to its `PlayerHand`.
    #[requires_action(Split)]
    pub fn split<C: CardSource>(&mut self, source: &mut C) -> Result<PlayerSubHand, ActionError> {
        let mut sibling = PlayerSubHand::new(self.owner);
        sibling.bet = self.bet;
        sibling.from_split = true;
        self.from_split = true;

        sibling.receive_card(self.hand.cards.swap_remove(1));
        sibling.receive_card(source.deal());
        self.hand.receive_card(source.deal());
        Ok(sibling)
    }
}

impl Deref for PlayerSubHand {
    type Target = Hand;

    fn deref(&self) -> &Hand {
        &self.hand
    }
}

impl fmt::Display for PlayerSubHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ({}{}, bet {})",
            self.hand,
            if self.is_soft() { "soft " } else { "" },
            self.value(),
            self.bet
        )
    }
}

/// All sub-hands of one player in a round. The first one is the primary hand
/// that receives the initial deal; splits append to the end.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHand {
    sub_hands: Vec<PlayerSubHand>,
}

impl PlayerHand {
    pub fn new(owner: PlayerId) -> PlayerHand {
        PlayerHand {
            sub_hands: vec![PlayerSubHand::new(owner)],
        }
    }

    pub fn primary(&self) -> &PlayerSubHand {
        &self.sub_hands[0]
    }

    pub fn primary_mut(&mut self) -> &mut PlayerSubHand {
        &mut self.sub_hands[0]
    }

    pub fn get(&self, index: usize) -> &PlayerSubHand {
        &self.sub_hands[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut PlayerSubHand {
        &mut self.sub_hands[index]
    }

    pub fn sub_hands(&self) -> &[PlayerSubHand] {
        &self.sub_hands
    }

    pub fn number_of_sub_hands(&self) -> usize {
        self.sub_hands.len()
    }

    /// Splits the given sub-hand and appends the new one.
    pub fn split_sub_hand<C: CardSource>(
        &mut self,
        index: usize,
        source: &mut C,
    ) -> Result<(), ActionError> {
        let sibling = self.sub_hands[index].split(source)?;
        self.sub_hands.push(sibling);
        Ok(())
    }
}

impl fmt::Display for PlayerHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.sub_hands.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", rendered.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::shoe::{MasterCursor, Shoe, ShoeCursor};
    use crate::simulation::Suit;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn card(face: Face) -> Card {
        Card::new(face, Suit::Heart)
    }

    fn hand_of(faces: &[Face]) -> Hand {
        let mut hand = Hand::new();
        for face in faces {
            hand.receive_card(card(*face));
        }
        hand
    }

    fn sub_hand_of(faces: &[Face]) -> PlayerSubHand {
        let mut sub_hand = PlayerSubHand::new(PlayerId(0));
        for face in faces {
            sub_hand.receive_card(card(*face));
        }
        sub_hand
    }

    /// A shoe that deals the given faces first.
    fn stacked(faces: &[Face]) -> MasterCursor {
        let mut master = MasterCursor::new(1, 0.7, StdRng::seed_from_u64(0));
        master.reload_with_firsts(faces).unwrap();
        master
    }

    #[test]
    fn soft_aces_are_lowered_one_at_a_time() {
        let hand = hand_of(&[Face::Ace, Face::Ace, Face::Nine]);
        assert_eq!(hand.value(), 21);
        assert!(hand.is_soft());
        assert!(!hand.is_blackjack());
        assert!(!hand.is_busted());
    }

    #[test]
    fn face_cards() {
        let hand = hand_of(&[Face::King, Face::Queen]);
        assert_eq!(hand.value(), 20);
        assert!(!hand.is_soft());
        assert!(!hand.is_blackjack());

        let hand = hand_of(&[Face::Ace, Face::King]);
        assert_eq!(hand.value(), 21);
        assert!(hand.is_blackjack());
        assert!(hand.is_soft());
    }

    #[test]
    fn hard_hand_busts() {
        let hand = hand_of(&[Face::King, Face::Six, Face::Ace, Face::Nine]);
        assert_eq!(hand.value(), 26);
        assert!(!hand.is_soft());
        assert!(hand.is_busted());
    }

    proptest! {
        #[test]
        fn blackjack_needs_exactly_two_cards(raws in prop::collection::vec(0u8..52, 2..8)) {
            let mut hand = Hand::new();
            for raw in &raws {
                hand.receive_card(Card::try_from(*raw).unwrap());
            }
            if hand.len() == 2 && hand.value() == 21 {
                prop_assert!(hand.is_blackjack());
            }
            if hand.len() >= 3 {
                prop_assert!(!hand.is_blackjack());
            }
            prop_assert_eq!(hand.is_busted(), hand.value() > 21);
            if hand.is_soft() {
                prop_assert!(hand.value() <= 21);
            }
        }
    }

    #[test]
    fn dealer_shows_second_card_even_when_hidden() {
        let mut dealer = DealerHand::new();
        dealer.receive_card(card(Face::Five));
        dealer.receive_card(card(Face::Ace));
        assert!(dealer.is_hole_card_hidden());
        assert_eq!(dealer.showing(), 11);
        assert_eq!(dealer.to_string(), "AH");

        dealer.flip_hole_card();
        assert_eq!(dealer.showing(), 11);
        assert_eq!(dealer.to_string(), "5H, AH");
        assert_eq!(dealer.value(), 16);
    }

    #[test]
    fn split_aces_cannot_hit() {
        let mut master = stacked(&[Face::Seven, Face::Eight]);
        let mut hand = PlayerHand::new(PlayerId(0));
        hand.primary_mut().receive_card(card(Face::Ace));
        hand.primary_mut().receive_card(card(Face::Ace));
        hand.split_sub_hand(0, &mut master).unwrap();

        assert_eq!(hand.number_of_sub_hands(), 2);
        for sub_hand in hand.sub_hands() {
            assert!(sub_hand.is_from_split());
            assert!(sub_hand.value() <= 20);
            assert!(!sub_hand.can_hit());
            assert!(!sub_hand.is_legal(Action::Hit));
            assert!(!sub_hand.is_legal(Action::Double));
        }
        // The new sub-hand is dealt first.
        assert_eq!(hand.get(1).value(), 18);
        assert_eq!(hand.get(0).value(), 19);
    }

    #[test]
    fn split_moves_second_card_and_marks_both() {
        let mut master = stacked(&[Face::Two, Face::Three]);
        let mut hand = PlayerHand::new(PlayerId(0));
        hand.primary_mut().receive_card(Card::new(Face::Eight, Suit::Spade));
        hand.primary_mut().receive_card(Card::new(Face::Eight, Suit::Club));
        hand.split_sub_hand(0, &mut master).unwrap();

        let primary = hand.get(0);
        let sibling = hand.get(1);
        assert_eq!(primary.cards()[0], Card::new(Face::Eight, Suit::Spade));
        assert_eq!(sibling.cards()[0], Card::new(Face::Eight, Suit::Club));
        assert_eq!(sibling.cards()[1].face(), Face::Two);
        assert_eq!(primary.cards()[1].face(), Face::Three);
        assert!(primary.is_from_split() && sibling.is_from_split());
        assert!(primary.can_hit());
        assert_eq!(master.offset(), 2);
    }

    #[test]
    fn double_down_doubles_bet_and_finishes() {
        let mut master = stacked(&[Face::Two]);
        let mut sub_hand = sub_hand_of(&[Face::Five, Face::Four]);
        assert!(sub_hand.is_legal(Action::Double));
        sub_hand.double_down(&mut master).unwrap();

        assert_eq!(sub_hand.bet(), 2.0);
        assert_eq!(sub_hand.len(), 3);
        assert_eq!(sub_hand.value(), 11);
        assert!(sub_hand.can_hit());
        assert!(sub_hand.is_finished());
        assert!(!sub_hand.can_act());
    }

    #[test]
    fn illegal_actions_are_rejected_before_dealing() {
        let shoe = Shoe::new(1);
        let mut cursor = ShoeCursor::new(&shoe, 0);

        let mut three_cards = sub_hand_of(&[Face::Two, Face::Three, Face::Four]);
        let err = three_cards.double_down(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            ActionError::Illegal {
                action: Action::Double,
                ..
            }
        ));
        assert_eq!(three_cards.bet(), 1.0);

        let mut not_a_pair = sub_hand_of(&[Face::Two, Face::Three]);
        assert!(not_a_pair.split(&mut cursor).is_err());

        let mut twenty_one = sub_hand_of(&[Face::King, Face::Five, Face::Six]);
        assert!(twenty_one.hit(&mut cursor).is_err());

        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn pair_needs_same_face() {
        assert!(sub_hand_of(&[Face::King, Face::King]).can_split());
        assert!(!sub_hand_of(&[Face::King, Face::Queen]).can_split());
        assert!(!sub_hand_of(&[Face::Four, Face::Four, Face::Two]).can_split());
    }

    #[test]
    fn blackjack_and_twenty_one_cannot_act() {
        let blackjack = sub_hand_of(&[Face::Ace, Face::Jack]);
        assert!(!blackjack.can_hit());
        assert!(blackjack.is_legal(Action::Stand));
        assert!(!blackjack.is_legal(Action::Double));
    }
}
