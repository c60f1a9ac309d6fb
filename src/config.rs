use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MAXIMUM_HOUR: u32 = 23;
pub const MAXIMUM_DURATION_MINUTES: i64 = 24 * 60;
pub const MAXIMUM_ALERT_DAYS: u32 = 365;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("reminder hour must be between 0 and 23, got {0}")]
    InvalidHour(u32),
    #[error("reminder duration must be between 1 and 1440 minutes, got {0}")]
    InvalidDuration(i64),
    #[error("reminder alert must be at most 365 days ahead, got {0}")]
    InvalidAlertDays(u32),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// IANA zone deciding what "today" is, the machine's local zone otherwise.
    pub timezone: Option<Tz>,
    /// Where `.ics` reminders are written, `<data>/reminders` otherwise.
    pub reminders: Option<PathBuf>,
    pub reminder: ReminderSettings,
}

impl Configuration {
    pub fn load(path: &Path) -> Result<Configuration> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let config: Configuration = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", path.display()))?;
        config
            .reminder
            .validate()
            .with_context(|| format!("checking {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReminderSettings {
    pub title: Option<String>,
    pub hour: u32,
    pub duration_minutes: i64,
    pub alert_days: u32,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            title: None,
            hour: 21,
            duration_minutes: 60,
            alert_days: 3,
        }
    }
}

impl ReminderSettings {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.hour > MAXIMUM_HOUR {
            return Err(ConfigError::InvalidHour(self.hour));
        }
        if !(1..=MAXIMUM_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(ConfigError::InvalidDuration(self.duration_minutes));
        }
        if self.alert_days > MAXIMUM_ALERT_DAYS {
            return Err(ConfigError::InvalidAlertDays(self.alert_days));
        }
        Ok(())
    }
}

/// Everything a command needs besides the session: configuration, the data
/// directory and a fixed notion of now.
#[derive(Debug)]
pub struct Environment {
    pub config: Configuration,
    pub data_dir: PathBuf,
    pub today: NaiveDate,
    pub now: NaiveDateTime,
}

impl Environment {
    pub fn new(config: Configuration, data_dir: PathBuf, today: Option<NaiveDate>) -> Self {
        let now = match config.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        };
        Self {
            config,
            data_dir,
            today: today.unwrap_or(now.date()),
            now,
        }
    }

    pub fn reminders_dir(&self) -> PathBuf {
        self.config
            .reminders
            .clone()
            .unwrap_or_else(|| self.data_dir.join("reminders"))
    }
}
