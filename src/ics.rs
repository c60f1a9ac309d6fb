use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use tracing::info;

use crate::{
    config::{Environment, ReminderSettings},
    model::*,
    reminder::{Reminder, ReminderSink},
};

const FOLD_AT: usize = 70;
const ICS_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Splits lines longer than 70 characters, continuation lines start with a
/// single space.
fn fold(line: &str) -> String {
    if line.chars().count() <= FOLD_AT {
        return line.to_owned();
    }
    let chunks = line.chars().chunks(FOLD_AT);
    let folded = chunks
        .into_iter()
        .map(|chunk| chunk.collect::<String>())
        .join("\r\n ");
    folded
}

/// Escapes a TEXT property value. Line breaks become spaces.
fn text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

pub fn render(reminder: &Reminder, settings: &ReminderSettings, now: NaiveDateTime) -> String {
    let start = NaiveDateTime::new(
        reminder.anchor,
        NaiveTime::from_hms_opt(settings.hour, 0, 0).unwrap_or(NaiveTime::MIN),
    );
    let end = Duration::try_minutes(settings.duration_minutes)
        .and_then(|duration| start.checked_add_signed(duration))
        .unwrap_or(start);
    let title = settings.title.as_deref().unwrap_or(&reminder.title);

    let lines = vec![
        "BEGIN:VCALENDAR".to_owned(),
        "VERSION:2.0".to_owned(),
        "CALSCALE:GREGORIAN".to_owned(),
        "METHOD:PUBLISH".to_owned(),
        "PRODID:-//CardPay//EN".to_owned(),
        "BEGIN:VEVENT".to_owned(),
        format!("UID:{}@cardpay.local", new_id()),
        format!("DTSTAMP:{}", now.format(ICS_FORMAT)),
        format!("DTSTART:{}", start.format(ICS_FORMAT)),
        format!("DTEND:{}", end.format(ICS_FORMAT)),
        format!("SUMMARY:{}", text(title)),
        format!("DESCRIPTION:{}", text(&reminder.description)),
        "BEGIN:VALARM".to_owned(),
        format!("TRIGGER:-P{}D", settings.alert_days),
        "ACTION:DISPLAY".to_owned(),
        format!("DESCRIPTION:{}", text(&reminder.alarm_description)),
        "END:VALARM".to_owned(),
        "END:VEVENT".to_owned(),
        "END:VCALENDAR".to_owned(),
    ];

    let mut calendar = lines.iter().map(|l| fold(l)).join("\r\n");
    calendar.push_str("\r\n");
    calendar
}

pub fn file_name(reminder: &Reminder) -> String {
    format!("cardpay_{}.ics", reminder.anchor.format("%Y%m%d"))
}

/// Writes each reminder as an `.ics` file into a directory.
pub struct CalendarDirectory {
    directory: PathBuf,
    settings: ReminderSettings,
    now: NaiveDateTime,
    written: Option<PathBuf>,
}

impl CalendarDirectory {
    pub fn new(env: &Environment) -> Self {
        Self {
            directory: env.reminders_dir(),
            settings: env.config.reminder.clone(),
            now: env.now,
            written: None,
        }
    }

    pub fn last_written(&self) -> Option<&PathBuf> {
        self.written.as_ref()
    }
}

impl ReminderSink for CalendarDirectory {
    fn emit(&mut self, reminder: &Reminder) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.directory)
            .with_context(|| format!("creating {}", self.directory.display()))?;
        let path = self.directory.join(file_name(reminder));
        let calendar = render(reminder, &self.settings, self.now);
        std::fs::write(&path, calendar).with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
        self.written = Some(path);
        Ok(())
    }
}
