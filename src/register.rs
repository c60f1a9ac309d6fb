use clap::Args;
use colored::Colorize;
use ellipse::Ellipse;
use terminal_size::{terminal_size, Width};

use crate::{ledger::Ledger, model::*, session::Session, store::Store};

pub const ORPHAN: &str = "—";

#[derive(Debug, Args)]
pub struct Command {
    /// Earliest due date to include
    #[arg(short, long)]
    pub from: Option<NaiveDate>,
    /// Latest due date to include
    #[arg(short, long)]
    pub to: Option<NaiveDate>,
    #[arg(long)]
    pub width: Option<u16>,
}

/// Inclusive due date bounds. A `to` before `from` is pulled up to `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub adjusted: bool,
}

impl Range {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        match (from, to) {
            (Some(from), Some(to)) if to < from => Self {
                from: Some(from),
                to: Some(from),
                adjusted: true,
            },
            _ => Self {
                from,
                to,
                adjusted: false,
            },
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    pub payment: &'a Payment,
    pub card: Option<&'a Card>,
}

impl<'a> Entry<'a> {
    pub fn card_name(&self) -> &'a str {
        self.card.map_or(ORPHAN, |c| c.name.as_str())
    }
}

impl Ledger {
    /// Payments due within `range`, by due date then card name.
    pub fn register(&self, range: &Range) -> Vec<Entry<'_>> {
        self.payments()
            .iter()
            .filter(|p| range.contains(p.due_date))
            .map(|payment| Entry {
                payment,
                card: self.card(&payment.card_id),
            })
            .sorted_by_key(|e| {
                (
                    e.payment.due_date,
                    e.card.map(|c| c.name.to_lowercase()).unwrap_or_default(),
                )
            })
            .collect_vec()
    }
}

pub fn entries_total(entries: &[Entry]) -> i64 {
    total_cents(entries.iter().map(|e| e.payment.amount_cents))
}

struct Format {
    name_width: usize,
    value_width: usize,
}

impl Format {
    fn new(cmd: &Command) -> Self {
        let date_width = 12;
        let id_width = 36;
        let fixed_spaces = 3;

        let maximum_width = match (cmd.width, terminal_size()) {
            (Some(w), _) | (None, Some((Width(w), _))) => w as usize,
            _ => 100,
        };

        let value_width = 14;
        let name_width = maximum_width
            .saturating_sub(date_width + value_width + id_width + fixed_spaces)
            .max(8);

        Self {
            name_width,
            value_width,
        }
    }
}

struct Row<'r> {
    entry: &'r Entry<'r>,
}

impl<'r> Row<'r> {
    fn format(&self, format: &Format) -> String {
        format!(
            "{:12} {:name_width$} {:>value_width$} {}",
            self.entry.payment.due_date.format("%b %e, %Y").to_string(),
            self.entry
                .card_name()
                .truncate_ellipse(format.name_width.saturating_sub(3)),
            Dollars(self.entry.payment.amount_cents),
            self.entry.payment.id,
            name_width = format.name_width,
            value_width = format.value_width,
        )
    }
}

pub fn execute_command<S: Store>(session: &Session<S>, cmd: &Command) -> anyhow::Result<()> {
    let range = Range::new(cmd.from, cmd.to);
    if range.adjusted {
        println!("{}", "'To' date was before 'From', adjusted to match.".yellow());
    }

    let entries = session.ledger.register(&range);
    if entries.is_empty() {
        println!("No payments yet.");
        return Ok(());
    }

    let format = Format::new(cmd);
    for entry in entries.iter() {
        let row = Row { entry };
        if entry.card.is_some() {
            println!("{}", row.format(&format));
        } else {
            println!("{}", row.format(&format).dimmed());
        }
    }

    println!(
        "{:12} {:name_width$} {:>value_width$}",
        "",
        "Total",
        Dollars(entries_total(&entries)),
        name_width = format.name_width,
        value_width = format.value_width,
    );

    Ok(())
}
