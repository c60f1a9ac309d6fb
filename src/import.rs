use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use bigdecimal::BigDecimal;
use clap::{Args, Subcommand, ValueEnum};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    backup::{records, BackupError, CARDS_TYPE, PAYMENTS_TYPE},
    config::Environment,
    confirm::{Acknowledgement, ConfirmError, Plan, REPLACE_TOKEN},
    ics::CalendarDirectory,
    ledger::Ledger,
    model::*,
    reminder::{ReminderOutcome, ReminderSink},
    session::Session,
    store::Store,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportMode {
    /// Keep existing records and add or update from the document
    #[default]
    Merge,
    /// Discard existing records first
    Replace,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error(transparent)]
    Format(#[from] BackupError),
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CardsImport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub skipped_invalid: usize,
}

impl std::fmt::Display for CardsImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} skipped",
            self.added, self.updated, self.skipped
        )?;
        if self.skipped_invalid > 0 {
            write!(f, ", {} invalid", self.skipped_invalid)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PaymentsImport {
    pub total: usize,
    pub added: usize,
    pub skipped_no_card: usize,
    pub skipped_duplicate: usize,
    pub skipped_invalid: usize,
}

impl std::fmt::Display for PaymentsImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} added", self.added)?;
        if self.skipped_duplicate > 0 {
            write!(f, ", {} duplicates", self.skipped_duplicate)?;
        }
        if self.skipped_no_card > 0 {
            write!(f, ", {} without matching card", self.skipped_no_card)?;
        }
        if self.skipped_invalid > 0 {
            write!(f, ", {} invalid", self.skipped_invalid)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imported<C> {
    pub counts: C,
    pub reminder: ReminderOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CardRecord {
    name: String,
    due_day: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PaymentRecord {
    card_id: Option<String>,
    card_name: Option<String>,
    amount_cents: i64,
    due_date: NaiveDate,
}

fn text(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Integral numbers and numeric strings, 1 through 31.
fn due_day(value: &Value) -> Option<u32> {
    let day = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if day.fract() != 0.0 {
        return None;
    }
    let day = day as u32;
    is_valid_due_day(day).then_some(day)
}

fn decimal(value: Option<&Value>) -> Option<BigDecimal> {
    match value? {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// `amountCents` wins over `amount` whenever it is a number.
fn amount_cents(raw: &Value) -> Option<i64> {
    match decimal(raw.get("amountCents")) {
        Some(cents) => whole_cents(&cents),
        None => cents_from_decimal(&decimal(raw.get("amount"))?),
    }
}

fn normalize_card(raw: &Value) -> Option<CardRecord> {
    Some(CardRecord {
        name: text(raw, "name")?,
        due_day: due_day(raw.get("dueDay")?)?,
    })
}

fn normalize_payment(raw: &Value) -> Option<PaymentRecord> {
    let amount_cents = amount_cents(raw)?;
    let due_date = parse_date(&text(raw, "dueDate")?)?;
    let card_id = text(raw, "cardId");
    let card_name = text(raw, "cardName");
    if card_id.is_none() && card_name.is_none() {
        return None;
    }
    Some(PaymentRecord {
        card_id,
        card_name,
        amount_cents,
        due_date,
    })
}

impl Ledger {
    pub fn plan_replace_cards(&self) -> Plan {
        Plan::new(
            format!(
                "Replace ALL {} card(s) with the import? This will also CLEAR all {} payment(s).",
                self.cards.len(),
                self.payments.len()
            ),
            REPLACE_TOKEN,
        )
    }

    pub fn plan_replace_payments(&self) -> Plan {
        Plan::new(
            format!(
                "Replace ALL {} payment(s) with the import? This cannot be undone.",
                self.payments.len()
            ),
            REPLACE_TOKEN,
        )
    }

    /// Reconciles a cards backup into the registry. The document is validated
    /// as a whole before anything changes; `ack` only matters when replacing.
    pub fn import_cards(
        &mut self,
        document: &Value,
        mode: ImportMode,
        ack: &Acknowledgement,
        sink: &mut dyn ReminderSink,
    ) -> Result<Imported<CardsImport>, ImportError> {
        let incoming = records(document, CARDS_TYPE, "cards")?;

        if mode == ImportMode::Replace {
            self.plan_replace_cards().accept(ack)?;
            self.cards.clear();
            self.payments.clear();
            self.lock.unlock();
            info!("cards replaced, payments cleared");
        }

        let mut counts = CardsImport::default();
        for raw in incoming {
            let Some(record) = normalize_card(raw) else {
                debug!("invalid card record: {}", raw);
                counts.skipped_invalid += 1;
                continue;
            };

            let existing = self
                .card_named(&record.name)
                .map(|c| (c.id.clone(), c.due_day));
            match existing {
                Some((_, due_day)) if due_day == record.due_day => counts.skipped += 1,
                Some((id, _)) => {
                    if let Some(card) = self.cards.iter_mut().find(|c| c.id == id) {
                        card.due_day = record.due_day;
                    }
                    counts.updated += 1;
                }
                None => {
                    self.cards.push(Card {
                        id: new_id(),
                        name: record.name,
                        due_day: record.due_day,
                    });
                    counts.added += 1;
                }
            }
        }

        info!(
            added = counts.added,
            updated = counts.updated,
            skipped = counts.skipped,
            invalid = counts.skipped_invalid,
            "cards imported"
        );

        let reminder = self.remind(sink);

        Ok(Imported { counts, reminder })
    }

    /// Reconciles a payments backup into the ledger, resolving each record's
    /// card by id and then by name and applying the same duplicate rules as
    /// [`Ledger::record_payment`], including against earlier records of the
    /// same document.
    pub fn import_payments(
        &mut self,
        document: &Value,
        mode: ImportMode,
        ack: &Acknowledgement,
        sink: &mut dyn ReminderSink,
    ) -> Result<Imported<PaymentsImport>, ImportError> {
        let incoming = records(document, PAYMENTS_TYPE, "payments")?;

        if mode == ImportMode::Replace {
            self.plan_replace_payments().accept(ack)?;
            self.payments.clear();
            self.lock.unlock();
            info!("payments replaced");
        }

        let mut counts = PaymentsImport::default();
        for raw in incoming {
            counts.total += 1;

            let Some(record) = normalize_payment(raw) else {
                debug!("invalid payment record: {}", raw);
                counts.skipped_invalid += 1;
                continue;
            };

            let card_id = record
                .card_id
                .as_deref()
                .and_then(|id| self.card(id))
                .or_else(|| record.card_name.as_deref().and_then(|n| self.card_named(n)))
                .map(|c| c.id.clone());
            let Some(card_id) = card_id else {
                counts.skipped_no_card += 1;
                continue;
            };

            if self.check_duplicate(&card_id, record.due_date).any() {
                counts.skipped_duplicate += 1;
                continue;
            }

            self.payments.push(Payment {
                id: new_id(),
                card_id,
                amount_cents: record.amount_cents,
                due_date: record.due_date,
            });
            counts.added += 1;
        }

        info!(
            total = counts.total,
            added = counts.added,
            no_card = counts.skipped_no_card,
            duplicate = counts.skipped_duplicate,
            invalid = counts.skipped_invalid,
            "payments imported"
        );

        let reminder = self.remind(sink);

        Ok(Imported { counts, reminder })
    }
}

#[derive(Debug, Args)]
pub struct Command {
    #[command(subcommand)]
    command: ImportCommands,
}

#[derive(Debug, Subcommand)]
enum ImportCommands {
    /// Merge or replace cards from a cards backup
    Cards(Source),
    /// Merge or replace payments from a payments backup
    Payments(Source),
}

#[derive(Debug, Args)]
struct Source {
    file: PathBuf,
    #[arg(short, long, value_enum, default_value_t = ImportMode::Merge)]
    mode: ImportMode,
    #[command(flatten)]
    ack: Acknowledgement,
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).context(BackupError::InvalidFormat)
}

fn replaced(mode: ImportMode) -> &'static str {
    match mode {
        ImportMode::Replace => " (replaced all)",
        ImportMode::Merge => "",
    }
}

pub fn execute_command<S: Store>(
    session: &mut Session<S>,
    env: &Environment,
    cmd: &Command,
) -> anyhow::Result<()> {
    let mut calendar = CalendarDirectory::new(env);

    let reminder = match &cmd.command {
        ImportCommands::Cards(source) => {
            let document = read_document(&source.file)?;
            records(&document, CARDS_TYPE, "cards")?;
            if source.mode == ImportMode::Replace && source.ack.is_empty() {
                println!("{}", session.ledger.plan_replace_cards().prompt());
                return Ok(());
            }

            let imported =
                session
                    .ledger
                    .import_cards(&document, source.mode, &source.ack, &mut calendar)?;
            session.save()?;
            println!("Import complete: {}{}", imported.counts, replaced(source.mode));
            imported.reminder
        }
        ImportCommands::Payments(source) => {
            let document = read_document(&source.file)?;
            records(&document, PAYMENTS_TYPE, "payments")?;
            if source.mode == ImportMode::Replace && source.ack.is_empty() {
                println!("{}", session.ledger.plan_replace_payments().prompt());
                return Ok(());
            }

            let imported =
                session
                    .ledger
                    .import_payments(&document, source.mode, &source.ack, &mut calendar)?;
            session.save()?;
            println!("Payments import: {}{}", imported.counts, replaced(source.mode));
            imported.reminder
        }
    };

    println!("{}", reminder);
    if let Some(path) = calendar.last_written() {
        println!("{}", path.display());
    }

    Ok(())
}
