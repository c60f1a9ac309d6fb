use chrono::{Datelike, Months};
use clap::{Args, Subcommand};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::Environment,
    confirm::{Acknowledgement, ConfirmError, Plan, CLEAR_TOKEN},
    ics::CalendarDirectory,
    ledger::Ledger,
    model::*,
    registry::CardError,
    reminder::{ReminderOutcome, ReminderSink},
    session::Session,
    store::Store,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("No card with id '{0}'.")]
    UnknownCard(String),
    #[error("Please enter a valid amount.")]
    InvalidAmount,
    #[error("A payment for this card on this due date already exists.")]
    DuplicateExact,
    #[error("A payment for this card is already recorded for this month. Remove it first to replace.")]
    DuplicateCycle,
    #[error("No payment '{0}'.")]
    NotFound(String),
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    first
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// The next date a card falls due. On or after this month's due day the target
/// moves to next month; the day is clamped to the target month's length.
pub fn next_due_date(due_day: u32, today: NaiveDate) -> NaiveDate {
    let (mut year, mut month) = (today.year(), today.month());
    if today.day() >= due_day {
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    let day = due_day.clamp(1, last_day_of_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Duplicate {
    pub exact: bool,
    pub same_cycle: bool,
}

impl Duplicate {
    pub fn any(&self) -> bool {
        self.exact || self.same_cycle
    }
}

fn same_cycle(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub payment: Payment,
    pub reminder: ReminderOutcome,
}

impl Ledger {
    pub fn check_duplicate(&self, card_id: &str, candidate: NaiveDate) -> Duplicate {
        self.payments_for(card_id)
            .fold(Duplicate::default(), |acc, p| Duplicate {
                exact: acc.exact || p.due_date == candidate,
                same_cycle: acc.same_cycle || same_cycle(p.due_date, candidate),
            })
    }

    /// Validates card, then amount, then duplicates, and appends. Coverage may
    /// now be complete, so the reminder lock is re-evaluated.
    pub fn record_payment(
        &mut self,
        card_id: &str,
        amount: f64,
        due_date: NaiveDate,
        sink: &mut dyn ReminderSink,
    ) -> Result<Recorded, PaymentError> {
        if self.card(card_id).is_none() {
            return Err(PaymentError::UnknownCard(card_id.to_owned()));
        }
        let amount_cents = cents_from_dollars(amount).ok_or(PaymentError::InvalidAmount)?;
        let duplicate = self.check_duplicate(card_id, due_date);
        if duplicate.exact {
            return Err(PaymentError::DuplicateExact);
        }
        if duplicate.same_cycle {
            return Err(PaymentError::DuplicateCycle);
        }

        let payment = Payment {
            id: new_id(),
            card_id: card_id.to_owned(),
            amount_cents,
            due_date,
        };
        info!(id = %payment.id, card_id, amount_cents, due = %due_date, "payment recorded");
        self.payments.push(payment.clone());

        let reminder = self.remind(sink);

        Ok(Recorded { payment, reminder })
    }

    pub fn remove_payment(&mut self, id: &str) -> Result<(), PaymentError> {
        let position = self
            .payments
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PaymentError::NotFound(id.to_owned()))?;
        self.payments.remove(position);
        self.unlock_if_empty();
        info!(id, remaining = self.payments.len(), "payment removed");
        Ok(())
    }

    pub fn plan_clear(&self) -> Plan {
        Plan::new(
            format!(
                "Clear ALL {} payment(s)? This cannot be undone.",
                self.payments.len()
            ),
            CLEAR_TOKEN,
        )
    }

    /// Empties the ledger once `ack` satisfies [`Ledger::plan_clear`]. Always
    /// leaves the reminder lock open.
    pub fn clear_all(&mut self, ack: &Acknowledgement) -> Result<usize, ConfirmError> {
        self.plan_clear().accept(ack)?;
        let removed = self.payments.len();
        self.payments.clear();
        self.lock.unlock();
        info!(removed, "payments cleared");
        Ok(removed)
    }
}

#[derive(Debug, Args)]
pub struct Command {
    #[command(subcommand)]
    command: PaymentCommands,
}

#[derive(Debug, Subcommand)]
enum PaymentCommands {
    /// Record a payment, defaulting the due date to the card's next due date
    Add {
        card: String,
        amount: f64,
        #[arg(short, long)]
        due: Option<NaiveDate>,
    },
    Remove {
        id: String,
    },
    /// Remove every payment, requires --yes --token CLEAR
    Clear {
        #[command(flatten)]
        ack: Acknowledgement,
    },
    /// Show the next due date for a card
    NextDue {
        card: String,
    },
}

pub fn execute_command<S: Store>(
    session: &mut Session<S>,
    env: &Environment,
    cmd: &Command,
) -> anyhow::Result<()> {
    match &cmd.command {
        PaymentCommands::Add { card, amount, due } => {
            let card = session
                .ledger
                .find_card(card)
                .cloned()
                .ok_or_else(|| CardError::NotFound(card.clone()))?;
            let due = due.unwrap_or_else(|| next_due_date(card.due_day, env.today));
            debug!(card = %card.name, %due, "recording");

            let mut calendar = CalendarDirectory::new(env);
            let recorded = session
                .ledger
                .record_payment(&card.id, *amount, due, &mut calendar)?;
            session.save()?;

            println!(
                "saved {} {} due {} {}",
                card.name,
                Dollars(recorded.payment.amount_cents),
                recorded.payment.due_date,
                recorded.payment.id
            );
            println!("{}", recorded.reminder);
            if let Some(path) = calendar.last_written() {
                println!("{}", path.display());
            }
        }
        PaymentCommands::Remove { id } => {
            session.ledger.remove_payment(id)?;
            session.save()?;
            println!("removed {}", id);
        }
        PaymentCommands::Clear { ack } => {
            if session.ledger.payments().is_empty() {
                println!("No payments to clear.");
                return Ok(());
            }
            if ack.is_empty() {
                println!("{}", session.ledger.plan_clear().prompt());
                return Ok(());
            }
            let removed = session.ledger.clear_all(ack)?;
            session.save()?;
            println!("All payments cleared ({}).", removed);
        }
        PaymentCommands::NextDue { card } => {
            let card = session
                .ledger
                .find_card(card)
                .ok_or_else(|| CardError::NotFound(card.clone()))?;
            println!("{}", next_due_date(card.due_day, env.today));
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

    fn ledger_with(names: &[&str]) -> Result<(Ledger, Vec<String>)> {
        let mut ledger = Ledger::new();
        let mut ids = Vec::new();
        for name in names {
            ids.push(ledger.add_card(name, 15)?.id);
        }
        Ok((ledger, ids))
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2025, 2), 28);
        assert_eq!(last_day_of_month(2024, 2), 29);
        assert_eq!(last_day_of_month(2025, 4), 30);
        assert_eq!(last_day_of_month(2025, 12), 31);
    }

    #[test]
    fn test_next_due_date_later_this_month() {
        assert_eq!(next_due_date(20, date(2025, 3, 10)), date(2025, 3, 20));
    }

    #[test]
    fn test_next_due_date_on_due_day_moves_to_next_month() {
        assert_eq!(next_due_date(10, date(2025, 3, 10)), date(2025, 4, 10));
    }

    #[test]
    fn test_next_due_date_clamps_to_short_month() {
        assert_eq!(next_due_date(31, date(2025, 3, 31)), date(2025, 4, 30));
        assert_eq!(next_due_date(30, date(2025, 1, 30)), date(2025, 2, 28));
        assert_eq!(next_due_date(31, date(2024, 2, 10)), date(2024, 2, 29));
    }

    #[test]
    fn test_next_due_date_february_into_march() {
        assert_eq!(next_due_date(31, date(2025, 2, 20)), date(2025, 2, 28));
        assert_eq!(next_due_date(31, date(2025, 2, 28)), date(2025, 2, 28));
        assert_eq!(next_due_date(31, date(2025, 3, 1)), date(2025, 3, 31));
        assert_eq!(next_due_date(28, date(2025, 2, 28)), date(2025, 3, 28));
    }

    #[test]
    fn test_next_due_date_december_rolls_year() {
        assert_eq!(next_due_date(5, date(2025, 12, 20)), date(2026, 1, 5));
    }

    #[test]
    fn test_next_due_date_day_is_min_of_due_day_and_month_length() {
        let mut today = date(2024, 1, 1);
        while today < date(2026, 1, 1) {
            for due_day in 1..=31 {
                let next = next_due_date(due_day, today);
                assert_eq!(
                    next.day(),
                    due_day.min(last_day_of_month(next.year(), next.month()))
                );
            }
            today = today.succ_opt().expect("date overflow");
        }
    }

    #[test]
    fn test_check_duplicate() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa", "Amex"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;

        assert_eq!(
            ledger.check_duplicate(&ids[0], date(2025, 3, 15)),
            Duplicate {
                exact: true,
                same_cycle: true
            }
        );
        assert_eq!(
            ledger.check_duplicate(&ids[0], date(2025, 3, 28)),
            Duplicate {
                exact: false,
                same_cycle: true
            }
        );
        assert!(!ledger.check_duplicate(&ids[0], date(2025, 4, 15)).any());
        assert!(!ledger.check_duplicate(&ids[0], date(2024, 3, 15)).any());
        assert!(!ledger.check_duplicate(&ids[1], date(2025, 3, 15)).any());

        Ok(())
    }

    #[test]
    fn test_record_payment_duplicate_cycle() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa", "Amex"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        let recorded = ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;
        assert_eq!(recorded.payment.amount_cents, 5000);

        assert_eq!(
            ledger.record_payment(&ids[0], 50.0, date(2025, 3, 28), &mut sink),
            Err(PaymentError::DuplicateCycle)
        );
        assert_eq!(
            ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink),
            Err(PaymentError::DuplicateExact)
        );
        assert_eq!(ledger.payments().len(), 1);

        Ok(())
    }

    #[test]
    fn test_record_payment_validation_order() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;

        assert_eq!(
            ledger.record_payment("missing", -1.0, date(2025, 3, 15), &mut sink),
            Err(PaymentError::UnknownCard("missing".to_owned()))
        );
        assert_eq!(
            ledger.record_payment(&ids[0], f64::NAN, date(2025, 3, 15), &mut sink),
            Err(PaymentError::InvalidAmount)
        );
        assert_eq!(
            ledger.record_payment(&ids[0], -5.0, date(2025, 3, 15), &mut sink),
            Err(PaymentError::InvalidAmount)
        );

        Ok(())
    }

    #[test]
    fn test_record_payment_zero_amount_allowed() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        let recorded = ledger.record_payment(&ids[0], 0.0, date(2025, 3, 15), &mut sink)?;
        assert_eq!(recorded.payment.amount_cents, 0);

        Ok(())
    }

    #[test]
    fn test_record_payment_completes_coverage_once() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa", "Amex"])?;
        let mut sink: Vec<Reminder> = Vec::new();

        let first = ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;
        assert!(!first.reminder.emitted());
        assert!(!ledger.lock().is_locked());

        let second = ledger.record_payment(&ids[1], 25.0, date(2025, 3, 3), &mut sink)?;
        assert!(second.reminder.emitted());
        assert!(ledger.lock().is_locked());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].anchor, date(2025, 3, 3));

        let again = ledger.remind(&mut sink);
        assert_eq!(again, ReminderOutcome::AlreadyLocked);

        let third = ledger.record_payment(&ids[1], 25.0, date(2025, 4, 3), &mut sink)?;
        assert_eq!(third.reminder, ReminderOutcome::AlreadyLocked);
        assert_eq!(sink.len(), 1);

        Ok(())
    }

    #[test]
    fn test_remove_payment_last_unlocks() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        let recorded = ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;
        assert!(ledger.lock().is_locked());

        ledger.remove_payment(&recorded.payment.id)?;
        assert!(!ledger.lock().is_locked());
        assert_eq!(
            ledger.remove_payment(&recorded.payment.id),
            Err(PaymentError::NotFound(recorded.payment.id.clone()))
        );

        ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;
        assert_eq!(sink.len(), 2);

        Ok(())
    }

    #[test]
    fn test_clear_all_requires_acknowledgement() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;

        assert_eq!(
            ledger.clear_all(&Acknowledgement::new(true, "clear")),
            Err(ConfirmError::TokenMismatch { expected: "CLEAR" })
        );
        assert_eq!(
            ledger.clear_all(&Acknowledgement::new(false, "CLEAR")),
            Err(ConfirmError::Declined)
        );
        assert_eq!(ledger.payments().len(), 1);
        assert!(ledger.lock().is_locked());

        assert_eq!(ledger.clear_all(&Acknowledgement::new(true, "CLEAR")), Ok(1));
        assert!(ledger.payments().is_empty());
        assert!(!ledger.lock().is_locked());

        Ok(())
    }

    #[test]
    fn test_plan_clear_describes_effect() -> Result<()> {
        let (mut ledger, ids) = ledger_with(&["Visa"])?;
        let mut sink: Vec<Reminder> = Vec::new();
        ledger.record_payment(&ids[0], 50.0, date(2025, 3, 15), &mut sink)?;

        let plan = ledger.plan_clear();
        assert_eq!(plan.token, "CLEAR");
        assert!(plan.description.contains("1 payment"));

        Ok(())
    }
}
