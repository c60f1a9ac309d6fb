use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{config::Environment, ledger::Ledger, model::*, session::Session, store::Store};

pub const CARDS_TYPE: &str = "cardpaypro.cards";
pub const PAYMENTS_TYPE: &str = "cardpaypro.payments";
pub const CURRENCY: &str = "USD";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackupError {
    #[error("Invalid backup format")]
    InvalidFormat,
    #[error("No payments saved to back up.")]
    NothingToExport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsBackup<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: &'static str,
    pub exported_at: String,
    pub cards: &'a [Card],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsBackup {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: &'static str,
    pub exported_at: String,
    pub count: usize,
    pub currency: &'static str,
    pub payments: Vec<PaymentEntry>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub id: String,
    pub card_id: String,
    pub card_name: Option<String>,
    pub amount_cents: i64,
    pub amount: f64,
    pub due_date: NaiveDate,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Ledger {
    pub fn export_cards(&self, at: DateTime<Utc>) -> CardsBackup<'_> {
        CardsBackup {
            kind: CARDS_TYPE,
            version: env!("CARGO_PKG_VERSION"),
            exported_at: timestamp(at),
            cards: self.cards(),
        }
    }

    pub fn export_payments(&self, at: DateTime<Utc>) -> Result<PaymentsBackup, BackupError> {
        if self.payments().is_empty() {
            return Err(BackupError::NothingToExport);
        }

        let payments = self
            .payments()
            .iter()
            .map(|p| PaymentEntry {
                id: p.id.clone(),
                card_id: p.card_id.clone(),
                card_name: self.card(&p.card_id).map(|c| c.name.clone()),
                amount_cents: p.amount_cents,
                amount: p.amount_cents as f64 / 100.0,
                due_date: p.due_date,
            })
            .collect_vec();

        Ok(PaymentsBackup {
            kind: PAYMENTS_TYPE,
            version: env!("CARGO_PKG_VERSION"),
            exported_at: timestamp(at),
            count: payments.len(),
            currency: CURRENCY,
            payments,
        })
    }
}

/// The record array of a backup document, provided its `type` is `kind` and
/// `field` holds an array. Anything else is rejected as a whole.
pub fn records<'v>(document: &'v Value, kind: &str, field: &str) -> Result<&'v [Value], BackupError> {
    match (
        document.get("type").and_then(Value::as_str),
        document.get(field).and_then(Value::as_array),
    ) {
        (Some(t), Some(records)) if t == kind => Ok(records),
        _ => Err(BackupError::InvalidFormat),
    }
}

pub fn file_name(prefix: &str, today: NaiveDate) -> String {
    format!("{}_backup_{}.json", prefix, today.format("%Y%m%d"))
}

#[derive(Debug, Args)]
pub struct Command {
    #[command(subcommand)]
    command: ExportCommands,
}

#[derive(Debug, Subcommand)]
enum ExportCommands {
    /// Write every card to a backup document
    Cards {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write every payment, with its card's name, to a backup document
    Payments {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    info!("wrote {}", path.display());
    Ok(())
}

pub fn execute_command<S: Store>(
    session: &Session<S>,
    env: &Environment,
    cmd: &Command,
) -> anyhow::Result<()> {
    let now = Utc::now();

    match &cmd.command {
        ExportCommands::Cards { output } => {
            let path = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(file_name("cards", env.today)));
            let backup = session.ledger.export_cards(now);
            write_pretty(&path, &backup)?;
            println!("Cards backup written to {} ({} cards)", path.display(), backup.cards.len());
        }
        ExportCommands::Payments { output } => {
            let backup = session.ledger.export_payments(now)?;
            let path = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(file_name("payments", env.today)));
            write_pretty(&path, &backup)?;
            println!("Payments backup written to {} ({} payments)", path.display(), backup.count);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .single()
            .expect("inline date error")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("inline date error")
    }

    #[test]
    fn test_export_cards_document() -> Result<()> {
        let mut ledger = Ledger::new();
        ledger.add_card("Visa", 15)?;
        let value = serde_json::to_value(ledger.export_cards(at()))?;

        assert_eq!(value["type"], "cardpaypro.cards");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["exportedAt"], "2025-03-01T12:00:00.000Z");
        assert_eq!(value["cards"][0]["name"], "Visa");
        assert_eq!(value["cards"][0]["dueDay"], 15);

        Ok(())
    }

    #[test]
    fn test_export_payments_refuses_empty_ledger() {
        let ledger = Ledger::new();
        assert_eq!(
            ledger.export_payments(at()).map(|b| b.count),
            Err(BackupError::NothingToExport)
        );
    }

    #[test]
    fn test_export_payments_names_cards_and_orphans() -> Result<()> {
        let mut ledger = Ledger::new();
        let visa = ledger.add_card("Visa", 15)?;
        ledger.payments.push(Payment {
            id: "p1".to_owned(),
            card_id: visa.id.clone(),
            amount_cents: 123456,
            due_date: date(2025, 3, 15),
        });
        ledger.payments.push(Payment {
            id: "p2".to_owned(),
            card_id: "gone".to_owned(),
            amount_cents: 5,
            due_date: date(2025, 3, 20),
        });

        let value = serde_json::to_value(ledger.export_payments(at())?)?;
        assert_eq!(value["type"], "cardpaypro.payments");
        assert_eq!(value["count"], 2);
        assert_eq!(value["currency"], "USD");
        assert_eq!(value["payments"][0]["cardName"], "Visa");
        assert_eq!(value["payments"][0]["amountCents"], 123456);
        assert_eq!(value["payments"][0]["amount"], 1234.56);
        assert_eq!(value["payments"][0]["dueDate"], "2025-03-15");
        assert_eq!(value["payments"][1]["cardName"], Value::Null);
        assert_eq!(value["payments"][1]["amount"], 0.05);

        Ok(())
    }

    #[test]
    fn test_records_validates_type_and_array() {
        let good = json!({ "type": "cardpaypro.cards", "cards": [{ "name": "Visa" }] });
        assert_eq!(records(&good, CARDS_TYPE, "cards").map(|r| r.len()), Ok(1));

        let wrong_type = json!({ "type": "cardpaypro.payments", "cards": [] });
        assert_eq!(
            records(&wrong_type, CARDS_TYPE, "cards").map(|r| r.len()),
            Err(BackupError::InvalidFormat)
        );

        let not_array = json!({ "type": "cardpaypro.cards", "cards": {} });
        assert_eq!(
            records(&not_array, CARDS_TYPE, "cards").map(|r| r.len()),
            Err(BackupError::InvalidFormat)
        );

        assert_eq!(
            records(&json!([1, 2]), CARDS_TYPE, "cards").map(|r| r.len()),
            Err(BackupError::InvalidFormat)
        );
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("cards", date(2025, 3, 1)), "cards_backup_20250301.json");
        assert_eq!(file_name("payments", date(2025, 12, 31)), "payments_backup_20251231.json");
    }
}
