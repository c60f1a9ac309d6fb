use clap::{Args, Subcommand};
use thiserror::Error;
use tracing::info;

use crate::{ledger::Ledger, model::*, session::Session, store::Store};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("Please enter a card name.")]
    InvalidName,
    #[error("Due day must be between 1 and 31, got {0}.")]
    InvalidDueDay(u32),
    #[error("A card named '{0}' already exists.")]
    DuplicateName(String),
    #[error("No card '{0}'.")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionResult {
    pub removed_payments: usize,
}

impl Ledger {
    fn validate_card(
        &self,
        editing: Option<&str>,
        name: &str,
        due_day: u32,
    ) -> Result<String, CardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CardError::InvalidName);
        }
        if !is_valid_due_day(due_day) {
            return Err(CardError::InvalidDueDay(due_day));
        }
        if self
            .cards
            .iter()
            .filter(|c| Some(c.id.as_str()) != editing)
            .any(|c| c.has_name(name))
        {
            return Err(CardError::DuplicateName(name.to_owned()));
        }
        Ok(name.to_owned())
    }

    pub fn add_card(&mut self, name: &str, due_day: u32) -> Result<Card, CardError> {
        let name = self.validate_card(None, name, due_day)?;
        let card = Card {
            id: new_id(),
            name,
            due_day,
        };
        info!(id = %card.id, name = %card.name, due_day, "card added");
        self.cards.push(card.clone());
        Ok(card)
    }

    pub fn edit_card(&mut self, id: &str, name: &str, due_day: u32) -> Result<(), CardError> {
        if self.card(id).is_none() {
            return Err(CardError::NotFound(id.to_owned()));
        }
        let name = self.validate_card(Some(id), name, due_day)?;
        if let Some(card) = self.cards.iter_mut().find(|c| c.id == id) {
            card.name = name;
            card.due_day = due_day;
            info!(id, name = %card.name, due_day, "card edited");
        }
        Ok(())
    }

    /// Removes the card and, in the same step, every payment recorded against it.
    pub fn delete_card(&mut self, id: &str) -> Result<DeletionResult, CardError> {
        let position = self
            .cards
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| CardError::NotFound(id.to_owned()))?;
        let card = self.cards.remove(position);

        let before = self.payments.len();
        self.payments.retain(|p| p.card_id != card.id);
        let removed_payments = before - self.payments.len();
        self.unlock_if_empty();

        info!(id, name = %card.name, removed_payments, "card deleted");

        Ok(DeletionResult { removed_payments })
    }
}

#[derive(Debug, Args)]
pub struct Command {
    #[command(subcommand)]
    command: CardCommands,
}

#[derive(Debug, Subcommand)]
enum CardCommands {
    /// Add a card with the day of month its payment is due
    Add { name: String, due_day: u32 },
    /// Rename a card or change its due day
    Edit {
        card: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        due_day: Option<u32>,
    },
    /// Delete a card along with its payments
    Delete { card: String },
    List {
        #[arg(short, long)]
        json: bool,
    },
}

pub fn execute_command<S: Store>(session: &mut Session<S>, cmd: &Command) -> anyhow::Result<()> {
    let ledger = &mut session.ledger;

    match &cmd.command {
        CardCommands::Add { name, due_day } => {
            let card = ledger.add_card(name, *due_day)?;
            session.save()?;
            println!("added {} (due day {}) {}", card.name, card.due_day, card.id);
        }
        CardCommands::Edit {
            card,
            name,
            due_day,
        } => {
            let existing = ledger
                .find_card(card)
                .cloned()
                .ok_or_else(|| CardError::NotFound(card.clone()))?;
            let name = name.as_deref().unwrap_or(&existing.name);
            let due_day = due_day.unwrap_or(existing.due_day);
            ledger.edit_card(&existing.id, name, due_day)?;
            session.save()?;
            println!("saved {}", existing.id);
        }
        CardCommands::Delete { card } => {
            let id = ledger
                .find_card(card)
                .map(|c| c.id.clone())
                .ok_or_else(|| CardError::NotFound(card.clone()))?;
            let deleted = ledger.delete_card(&id)?;
            session.save()?;
            println!(
                "deleted {} and {} payment(s)",
                card, deleted.removed_payments
            );
        }
        CardCommands::List { json } => {
            let cards = ledger.cards_by_name();
            if *json {
                serde_json::to_writer(std::io::stdout(), &cards)?;
                println!();
            } else if cards.is_empty() {
                println!("No cards yet.");
            } else {
                let width = cards.iter().map(|c| c.name.len()).max().unwrap_or_default();
                for card in cards {
                    println!(
                        "{:width$}  due day {:>2}  {}",
                        card.name,
                        card.due_day,
                        card.id,
                        width = width
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::Reminder;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("inline date error")
    }

    #[test]
    fn test_add_card_trims_name() -> Result<()> {
        let mut ledger = Ledger::new();
        let card = ledger.add_card("  Visa ", 15)?;
        assert_eq!(card.name, "Visa");
        assert_eq!(ledger.cards().len(), 1);

        Ok(())
    }

    #[test]
    fn test_add_card_rejects_blank_name() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.add_card("   ", 15), Err(CardError::InvalidName));
        assert!(ledger.cards().is_empty());
    }

    #[test]
    fn test_add_card_rejects_due_day_out_of_range() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.add_card("Visa", 0), Err(CardError::InvalidDueDay(0)));
        assert_eq!(ledger.add_card("Visa", 32), Err(CardError::InvalidDueDay(32)));
        assert!(ledger.add_card("Visa", 31).is_ok());
    }

    #[test]
    fn test_add_card_duplicate_name_ignores_case() -> Result<()> {
        let mut ledger = Ledger::new();
        ledger.add_card("Visa", 15)?;
        assert_eq!(
            ledger.add_card("vISA", 3),
            Err(CardError::DuplicateName("vISA".to_owned()))
        );
        assert_eq!(ledger.cards().len(), 1);

        Ok(())
    }

    #[test]
    fn test_edit_card_may_keep_own_name() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        ledger.edit_card(&visa.id, "VISA", 20)?;
        let edited = ledger.card(&visa.id).expect("card");
        assert_eq!(edited.name, "VISA");
        assert_eq!(edited.due_day, 20);

        Ok(())
    }

    #[test]
    fn test_edit_card_rejects_other_cards_name() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        ledger.add_card("Amex", 3)?;
        assert_eq!(
            ledger.edit_card(&visa.id, "amex", 15),
            Err(CardError::DuplicateName("amex".to_owned()))
        );
        assert_eq!(ledger.card(&visa.id).map(|c| c.name.as_str()), Some("Visa"));

        Ok(())
    }

    #[test]
    fn test_edit_card_unknown() {
        let mut ledger = Ledger::new();
        assert_eq!(
            ledger.edit_card("nope", "Visa", 1),
            Err(CardError::NotFound("nope".to_owned()))
        );
    }

    #[test]
    fn test_edit_card_invalid_day_leaves_card() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        assert_eq!(
            ledger.edit_card(&visa.id, "Visa Gold", 40),
            Err(CardError::InvalidDueDay(40))
        );
        assert_eq!(ledger.card(&visa.id), Some(&visa));

        Ok(())
    }

    #[test]
    fn test_delete_card_cascades_and_unlocks() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&visa.id, 10.0, date(2025, 1, 15), &mut sink)?;
        ledger.record_payment(&visa.id, 20.0, date(2025, 2, 15), &mut sink)?;
        ledger.record_payment(&visa.id, 30.0, date(2025, 3, 15), &mut sink)?;
        assert!(ledger.lock().is_locked());
        assert_eq!(sink.len(), 1);

        let deleted = ledger.delete_card(&visa.id)?;
        assert_eq!(deleted.removed_payments, 3);
        assert!(ledger.payments().is_empty());
        assert!(!ledger.lock().is_locked());

        Ok(())
    }

    #[test]
    fn test_delete_card_keeps_lock_when_payments_remain() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        let amex = ledger.add_card("Amex", 3)?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&visa.id, 10.0, date(2025, 1, 15), &mut sink)?;
        ledger.record_payment(&amex.id, 20.0, date(2025, 1, 3), &mut sink)?;
        assert!(ledger.lock().is_locked());

        let deleted = ledger.delete_card(&visa.id)?;
        assert_eq!(deleted.removed_payments, 1);
        assert!(ledger.lock().is_locked());

        Ok(())
    }

    #[test]
    fn test_find_card_by_id_or_name() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        assert_eq!(ledger.find_card(&visa.id), Some(&visa));
        assert_eq!(ledger.find_card("visa"), Some(&visa));
        assert_eq!(ledger.find_card("amex"), None);

        Ok(())
    }

    #[test]
    fn test_cards_by_name_sorted_case_insensitively() -> Result<()> {
        let mut ledger = Ledger::new();
        ledger.add_card("visa", 15)?;
        ledger.add_card("Amex", 3)?;
        ledger.add_card("discover", 9)?;
        assert_eq!(
            ledger
                .cards_by_name()
                .iter()
                .map(|c| c.name.as_str())
                .collect_vec(),
            vec!["Amex", "discover", "visa"]
        );

        Ok(())
    }
}
