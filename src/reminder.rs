use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::Environment,
    coverage::{coverage, Coverage},
    ics::CalendarDirectory,
    ledger::Ledger,
    model::*,
    session::Session,
    store::Store,
};

pub const REMINDER_TITLE: &str = "All Card Payments Due";

/// Gate allowing at most one reminder per coverage-completion. Cycles for the
/// life of the ledger; emptying the ledger is the only way back to unlocked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderLock {
    #[default]
    Unlocked,
    Locked,
}

impl ReminderLock {
    pub fn is_locked(&self) -> bool {
        matches!(self, ReminderLock::Locked)
    }

    pub(crate) fn lock(&mut self) {
        *self = ReminderLock::Locked;
    }

    pub(crate) fn unlock(&mut self) {
        *self = ReminderLock::Unlocked;
    }

    pub fn from_flag(flag: &str) -> Self {
        match flag.trim() {
            "1" => ReminderLock::Locked,
            _ => ReminderLock::Unlocked,
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            ReminderLock::Locked => "1",
            ReminderLock::Unlocked => "0",
        }
    }
}

impl std::fmt::Display for ReminderLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderLock::Locked => f.pad("Reminder created (locked)"),
            ReminderLock::Unlocked => f.pad("Reminder not created"),
        }
    }
}

/// Effective lock at startup: an empty ledger is always unlocked, whatever was
/// persisted.
pub fn reconcile_lock_on_load(payments: &[Payment], persisted: ReminderLock) -> ReminderLock {
    if payments.is_empty() {
        ReminderLock::Unlocked
    } else {
        persisted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub title: String,
    pub description: String,
    pub alarm_description: String,
    pub anchor: NaiveDate,
    pub total_cents: i64,
    pub card_count: usize,
}

impl Reminder {
    fn new(coverage: &Coverage, card_count: usize, anchor: NaiveDate) -> Self {
        let total = Dollars(coverage.total_cents);
        Self {
            title: REMINDER_TITLE.to_owned(),
            description: format!("Total across {} cards: {}", card_count, total),
            alarm_description: format!("Total due: {} across {} cards", total, card_count),
            anchor,
            total_cents: coverage.total_cents,
            card_count,
        }
    }
}

/// Receives reminder artifacts. Output only, nothing flows back except success.
pub trait ReminderSink {
    fn emit(&mut self, reminder: &Reminder) -> anyhow::Result<()>;
}

impl ReminderSink for Vec<Reminder> {
    fn emit(&mut self, reminder: &Reminder) -> anyhow::Result<()> {
        self.push(reminder.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Emitted(Reminder),
    AlreadyLocked,
    NoCards,
    Incomplete {
        covered: usize,
        total: usize,
        missing: Vec<String>,
    },
    Failed(String),
}

impl ReminderOutcome {
    pub fn emitted(&self) -> bool {
        matches!(self, ReminderOutcome::Emitted(_))
    }
}

impl std::fmt::Display for ReminderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderOutcome::Emitted(_) => write!(f, "All cards covered, reminder created"),
            ReminderOutcome::AlreadyLocked => write!(
                f,
                "Reminder already created, clear payments to generate a new one"
            ),
            ReminderOutcome::NoCards => write!(f, "No cards saved. Add cards first."),
            ReminderOutcome::Incomplete {
                covered,
                total,
                missing,
            } => write!(
                f,
                "{}/{} cards covered. Add payments for: {}",
                covered,
                total,
                missing.join(", ")
            ),
            ReminderOutcome::Failed(reason) => write!(f, "Reminder could not be created: {}", reason),
        }
    }
}

impl Ledger {
    /// Consults coverage and, when complete and unlocked, emits one reminder
    /// and locks. The lock only moves once the sink has accepted the artifact.
    pub fn remind(&mut self, sink: &mut dyn ReminderSink) -> ReminderOutcome {
        self.unlock_if_empty();

        if self.lock.is_locked() {
            return ReminderOutcome::AlreadyLocked;
        }

        let coverage = coverage(&self.cards, &self.payments);
        let anchor = match coverage.earliest_due_date {
            Some(earliest) if coverage.all_covered => earliest,
            _ if self.cards.is_empty() => return ReminderOutcome::NoCards,
            _ => {
                return ReminderOutcome::Incomplete {
                    covered: coverage.covered_count,
                    total: self.cards.len(),
                    missing: coverage.missing.iter().map(|c| c.name.clone()).collect(),
                }
            }
        };

        let reminder = Reminder::new(&coverage, self.cards.len(), anchor);
        match sink.emit(&reminder) {
            Ok(()) => {
                self.lock.lock();
                info!(anchor = %reminder.anchor, "reminder emitted, locked");
                ReminderOutcome::Emitted(reminder)
            }
            Err(e) => {
                warn!("reminder sink failed: {:?}", e);
                ReminderOutcome::Failed(e.to_string())
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct Command {}

pub fn execute_command<S: Store>(
    session: &mut Session<S>,
    env: &Environment,
    _cmd: &Command,
) -> anyhow::Result<()> {
    let mut calendar = CalendarDirectory::new(env);
    let outcome = session.ledger.remind(&mut calendar);
    session.save()?;

    println!("{}", outcome);
    if let Some(path) = calendar.last_written() {
        println!("{}", path.display());
    }

    Ok(())
}
