use std::collections::HashSet;

use clap::Args;
use colored::Colorize;
use serde::Serialize;

use crate::{model::*, session::Session, store::Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage<'a> {
    pub all_covered: bool,
    pub missing: Vec<&'a Card>,
    pub covered_count: usize,
    pub total_cents: i64,
    pub earliest_due_date: Option<NaiveDate>,
}

/// Whether every card has at least one payment. Totals span the whole ledger,
/// not only the missing cards.
pub fn coverage<'a>(cards: &'a [Card], payments: &[Payment]) -> Coverage<'a> {
    let paid: HashSet<&str> = payments.iter().map(|p| p.card_id.as_str()).collect();
    let missing = cards
        .iter()
        .filter(|c| !paid.contains(c.id.as_str()))
        .collect_vec();
    let covered_count = cards
        .iter()
        .filter(|c| paid.contains(c.id.as_str()))
        .count();

    Coverage {
        all_covered: !cards.is_empty() && missing.is_empty(),
        missing,
        covered_count,
        total_cents: total_cents(payments.iter().map(|p| p.amount_cents)),
        earliest_due_date: payments.iter().map(|p| p.due_date).min(),
    }
}

#[derive(Debug, Args)]
pub struct Command {
    #[arg(short, long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    cards: usize,
    covered: usize,
    all_covered: bool,
    missing: Vec<&'a str>,
    total_cents: i64,
    earliest_due_date: Option<NaiveDate>,
    locked: bool,
}

pub fn execute_command<S: Store>(session: &Session<S>, cmd: &Command) -> anyhow::Result<()> {
    let ledger = &session.ledger;
    let coverage = coverage(ledger.cards(), ledger.payments());

    if cmd.json {
        let status = Status {
            cards: ledger.cards().len(),
            covered: coverage.covered_count,
            all_covered: coverage.all_covered,
            missing: coverage.missing.iter().map(|c| c.name.as_str()).collect(),
            total_cents: coverage.total_cents,
            earliest_due_date: coverage.earliest_due_date,
            locked: ledger.lock().is_locked(),
        };
        serde_json::to_writer(std::io::stdout(), &status)?;
        println!();
        return Ok(());
    }

    println!(
        "{}/{} cards covered",
        coverage.covered_count,
        ledger.cards().len()
    );
    if !coverage.missing.is_empty() {
        let names = coverage.missing.iter().map(|c| c.name.as_str()).join(", ");
        println!("missing: {}", names.yellow());
    }
    println!("total: {}", Dollars(coverage.total_cents));
    if let Some(earliest) = coverage.earliest_due_date {
        println!("earliest due: {}", earliest);
    }
    let lock = ledger.lock();
    if lock.is_locked() {
        println!("{}", lock.to_string().red());
    } else {
        println!("{}", lock.to_string().green());
    }

    Ok(())
}
