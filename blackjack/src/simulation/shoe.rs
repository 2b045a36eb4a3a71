use super::{Card, Face, Suit};

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use strum::IntoEnumIterator;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ShoeError {
    #[error("the shoe does not hold enough {face:?} cards for the requested order")]
    NotEnoughCards { face: Face },
}

/// Anything cards can be dealt from.
pub trait CardSource {
    /// Returns the card under the cursor and moves past it.
    fn deal(&mut self) -> Card;
    /// Number of cards dealt since the last reload.
    fn offset(&self) -> usize;
}

/// Represents a shoe in the real world: `number_of_decks` full decks in one
/// shuffled order. Only whoever owns it can reorder it; cursors just read.
#[derive(Debug, Clone, PartialEq)]
pub struct Shoe {
    number_of_decks: u8,
    cards: Vec<Card>,
}

impl Shoe {
    /// Creates a new shoe with ordered cards.
    pub fn new(number_of_decks: u8) -> Shoe {
        Shoe {
            number_of_decks,
            cards: ordered_cards(number_of_decks),
        }
    }

    /// Rebuilds the full card sequence and shuffles it uniformly.
    pub fn reload<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards = ordered_cards(self.number_of_decks);
        self.cards.shuffle(rng);
    }

    /// Rebuilds the shoe so that it starts with cards of the given faces in the
    /// given order, followed by the remaining cards shuffled. Leaves the shoe
    /// untouched if the faces cannot be found.
    pub fn arrange_firsts<R: Rng + ?Sized>(
        &mut self,
        firsts: &[Face],
        rng: &mut R,
    ) -> Result<(), ShoeError> {
        let mut rest = ordered_cards(self.number_of_decks);
        let mut cards = Vec::with_capacity(rest.len());
        for face in firsts {
            let position = rest
                .iter()
                .position(|card| card.face() == *face)
                .ok_or(ShoeError::NotEnoughCards { face: *face })?;
            cards.push(rest.swap_remove(position));
        }

        rest.shuffle(rng);
        cards.extend(rest);
        self.cards = cards;
        Ok(())
    }

    /// The card at `offset`. Offsets past the end wrap to the front, so every
    /// offset names a card.
    pub fn card_at(&self, offset: usize) -> Card {
        self.cards[offset % self.cards.len()]
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn number_of_decks(&self) -> u8 {
        self.number_of_decks
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

/// Offset at which the master cursor reloads: the consumed fraction
/// `penetration` of the shoe, truncated.
pub fn reload_index(number_of_decks: u8, penetration: f64) -> usize {
    (penetration * (number_of_decks as usize * 52) as f64) as usize
}

fn ordered_cards(number_of_decks: u8) -> Vec<Card> {
    let mut cards = Vec::with_capacity(number_of_decks as usize * 52);
    for _ in 0..number_of_decks {
        for suit in Suit::iter() {
            for face in Face::iter() {
                cards.push(Card::new(face, suit));
            }
        }
    }
    cards
}

/// A read cursor over a shared shoe. Copying it forks an independent cursor at
/// the same position.
#[derive(Debug, Clone, Copy)]
pub struct ShoeCursor<'a> {
    shoe: &'a Shoe,
    offset: usize,
}

impl<'a> ShoeCursor<'a> {
    pub fn new(shoe: &'a Shoe, offset: usize) -> Self {
        Self { shoe, offset }
    }

    pub fn fork(&self) -> ShoeCursor<'a> {
        *self
    }
}

impl<'a> CardSource for ShoeCursor<'a> {
    fn deal(&mut self) -> Card {
        let card = self.shoe.card_at(self.offset);
        self.offset += 1;
        card
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

/// The long-lived cursor of the real game. It owns the shoe, so it is the only
/// thing that can reload it, and it can only do so while no fork is alive.
#[derive(Debug)]
pub struct MasterCursor {
    shoe: Shoe,
    offset: usize,
    reload_index: usize,
    rng: StdRng,
}

impl MasterCursor {
    /// Creates the cursor over a freshly shuffled shoe. `penetration` is the
    /// fraction of the shoe that may be dealt before the next reload.
    pub fn new(number_of_decks: u8, penetration: f64, rng: StdRng) -> Self {
        let shoe = Shoe::new(number_of_decks);
        let reload_index = reload_index(number_of_decks, penetration);
        let mut cursor = Self {
            shoe,
            offset: 0,
            reload_index,
            rng,
        };
        cursor.reload();
        cursor
    }

    pub fn needs_reload(&self) -> bool {
        self.offset >= self.reload_index
    }

    /// Reloads if the penetration has been reached. Returns true if it did.
    pub fn reload_if_necessary(&mut self) -> bool {
        if self.needs_reload() {
            self.reload();
            true
        } else {
            false
        }
    }

    pub fn reload(&mut self) {
        debug!(
            "reloading {}-deck shoe after {} cards",
            self.shoe.number_of_decks(),
            self.offset
        );
        self.shoe.reload(&mut self.rng);
        self.offset = 0;
    }

    /// Reloads with the given faces on top. Useful to replay a known situation.
    pub fn reload_with_firsts(&mut self, firsts: &[Face]) -> Result<(), ShoeError> {
        self.shoe.arrange_firsts(firsts, &mut self.rng)?;
        self.offset = 0;
        Ok(())
    }

    pub fn fork(&self) -> ShoeCursor<'_> {
        ShoeCursor::new(&self.shoe, self.offset)
    }

    /// Moves the cursor forward to `offset`, e.g. the deepest point any
    /// speculative branch reached this round.
    pub fn advance_to(&mut self, offset: usize) {
        debug_assert!(offset >= self.offset);
        self.offset = self.offset.max(offset);
    }

    pub fn shoe(&self) -> &Shoe {
        &self.shoe
    }
}

impl CardSource for MasterCursor {
    fn deal(&mut self) -> Card {
        let card = self.shoe.card_at(self.offset);
        self.offset += 1;
        card
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn number_of_cards_is_correct(shoe: &Shoe) -> bool {
        let mut counts = [0 as u8; 52];
        for card in shoe.cards() {
            let card_integer: u8 = (*card).into();
            counts[card_integer as usize] += 1;
        }

        counts.iter().all(|count| *count == shoe.number_of_decks())
    }

    fn master(number_of_decks: u8, seed: u64) -> MasterCursor {
        MasterCursor::new(number_of_decks, 0.7, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn new_shoe_is_ordered() {
        let number_of_decks = 3;
        let shoe = Shoe::new(number_of_decks);
        assert!(number_of_cards_is_correct(&shoe));
        assert_eq!(shoe.len(), number_of_decks as usize * 52);
        for i in 0..number_of_decks as usize {
            for raw in 0..52u8 {
                assert_eq!(shoe.cards()[i * 52 + raw as usize].raw(), raw);
            }
        }
    }

    #[test]
    fn reload_keeps_every_card() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut shoe = Shoe::new(2);
        shoe.reload(&mut rng);
        assert!(number_of_cards_is_correct(&shoe));
        assert_ne!(shoe, Shoe::new(2));
    }

    #[test]
    fn reload_is_deterministic_for_a_seed() {
        let a = master(6, 42);
        let b = master(6, 42);
        let c = master(6, 43);
        assert_eq!(a.shoe(), b.shoe());
        assert_ne!(a.shoe(), c.shoe());
    }

    #[test]
    fn test_arrange_firsts() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut shoe = Shoe::new(1);
        let firsts = vec![Face::Ace, Face::Two, Face::Six, Face::Six, Face::King];
        shoe.arrange_firsts(&firsts, &mut rng).unwrap();
        assert!(number_of_cards_is_correct(&shoe));
        for (i, face) in firsts.iter().enumerate() {
            assert_eq!(shoe.cards()[i].face(), *face);
        }
    }

    #[test]
    fn invalid_firsts_leave_shoe_untouched() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut shoe = Shoe::new(1);
        let before = shoe.clone();
        let firsts = [Face::Six; 5];
        assert_eq!(
            shoe.arrange_firsts(&firsts, &mut rng),
            Err(ShoeError::NotEnoughCards { face: Face::Six })
        );
        assert_eq!(shoe, before);
    }

    #[test]
    fn forked_cursor_never_moves_the_original() {
        let master = master(1, 9);
        let snapshot = master.shoe().clone();
        let mut fork = master.fork();
        let mut second = fork.fork();

        let dealt: Vec<Card> = (0..10).map(|_| fork.deal()).collect();
        assert_eq!(fork.offset(), 10);
        assert_eq!(second.offset(), 0);
        assert_eq!(master.offset(), 0);
        assert_eq!(master.shoe(), &snapshot);

        // An independent fork sees the same cards from the same position.
        let replay: Vec<Card> = (0..10).map(|_| second.deal()).collect();
        assert_eq!(dealt, replay);
    }

    #[test]
    fn master_reloads_at_penetration() {
        let mut master = master(1, 5);
        // 0.7 * 52 = 36.4, truncated to 36 cards.
        for _ in 0..36 {
            assert!(!master.needs_reload());
            master.deal();
        }
        assert!(master.needs_reload());
        assert!(master.reload_if_necessary());
        assert_eq!(master.offset(), 0);
        assert!(!master.reload_if_necessary());
    }

    #[test]
    fn advance_to_deepest_branch() {
        let mut master = master(1, 6);
        master.deal();
        let deepest = {
            let mut short = master.fork();
            let mut long = master.fork();
            short.deal();
            for _ in 0..5 {
                long.deal();
            }
            short.offset().max(long.offset())
        };
        master.advance_to(deepest);
        assert_eq!(master.offset(), 6);
    }

    #[test]
    fn dealing_past_the_end_wraps() {
        let shoe = Shoe::new(1);
        let mut cursor = ShoeCursor::new(&shoe, 51);
        assert_eq!(cursor.deal(), shoe.cards()[51]);
        assert_eq!(cursor.deal(), shoe.cards()[0]);
        assert_eq!(cursor.offset(), 53);
    }
}
