use crate::{
    model::*,
    reminder::{reconcile_lock_on_load, ReminderLock},
};

/// Cards, the payments recorded against them and the reminder lock. Every
/// mutation goes through methods on this type so the invariants between the
/// three are kept in one place.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    pub(crate) cards: Vec<Card>,
    pub(crate) payments: Vec<Payment>,
    pub(crate) lock: ReminderLock,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted documents, re-deriving the lock from
    /// ledger emptiness rather than trusting the stored flag.
    pub fn restore(cards: Vec<Card>, payments: Vec<Payment>, persisted: ReminderLock) -> Self {
        let lock = reconcile_lock_on_load(&payments, persisted);
        Self {
            cards,
            payments,
            lock,
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn lock(&self) -> ReminderLock {
        self.lock
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn card_named(&self, name: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.has_name(name))
    }

    /// Exact id first, then case-insensitive name.
    pub fn find_card(&self, id_or_name: &str) -> Option<&Card> {
        self.card(id_or_name)
            .or_else(|| self.card_named(id_or_name.trim()))
    }

    pub fn payments_for<'a>(&'a self, card_id: &'a str) -> impl Iterator<Item = &'a Payment> + 'a {
        self.payments.iter().filter(move |p| p.card_id == card_id)
    }

    pub fn cards_by_name(&self) -> Vec<&Card> {
        self.cards
            .iter()
            .sorted_by_key(|c| c.name.to_lowercase())
            .collect_vec()
    }

    /// An empty ledger never holds the lock.
    pub(crate) fn unlock_if_empty(&mut self) {
        if self.payments.is_empty() {
            self.lock.unlock();
        }
    }
}
