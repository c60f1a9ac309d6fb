use bigdecimal::{BigDecimal, RoundingMode, Signed, ToPrimitive};
use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};

pub use anyhow::Result;
pub use chrono::NaiveDate;
pub use itertools::Itertools;

pub const MINIMUM_DUE_DAY: u32 = 1;
pub const MAXIMUM_DUE_DAY: u32 = 31;
/// Largest single payment accepted, $10,000,000,000.00.
pub const MAXIMUM_AMOUNT_CENTS: i64 = 1_000_000_000_000;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    pub due_day: u32,
}

impl Card {
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub card_id: String,
    pub amount_cents: i64,
    #[serde(deserialize_with = "deserialize_date")]
    pub due_date: NaiveDate,
}

/// A plain `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

fn deserialize_date<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveDate, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse_date(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", value)))
}

pub fn is_valid_due_day(day: u32) -> bool {
    (MINIMUM_DUE_DAY..=MAXIMUM_DUE_DAY).contains(&day)
}

pub fn is_valid_amount(cents: i64) -> bool {
    (0..=MAXIMUM_AMOUNT_CENTS).contains(&cents)
}

/// Dollars to whole cents, rounding half away from zero. `None` for NaN,
/// infinities, negative amounts and anything above [`MAXIMUM_AMOUNT_CENTS`].
pub fn cents_from_dollars(amount: f64) -> Option<i64> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let cents = (amount * 100.0).round();
    if cents > MAXIMUM_AMOUNT_CENTS as f64 {
        None
    } else {
        Some(cents as i64)
    }
}

/// A cents value rounded to whole cents, halves rounding up. `None` when
/// negative or out of range.
pub fn whole_cents(value: &BigDecimal) -> Option<i64> {
    if value.is_negative() {
        return None;
    }
    value
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
        .filter(|cents| is_valid_amount(*cents))
}

pub fn cents_from_decimal(amount: &BigDecimal) -> Option<i64> {
    whole_cents(&(amount * BigDecimal::from(100)))
}

/// Sum of cents values, pinned at `i64::MAX` rather than overflowing.
pub fn total_cents(amounts: impl IntoIterator<Item = i64>) -> i64 {
    amounts.into_iter().fold(0i64, i64::saturating_add)
}

/// US-dollar rendering of a cents value, `$1,234.56`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dollars(pub i64);

impl std::fmt::Display for Dollars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = (magnitude / 100).to_string();
        let grouped = whole
            .as_bytes()
            .rchunks(3)
            .rev()
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .join(",");
        f.pad(&format!("{}${}.{:02}", sign, grouped, magnitude % 100))
    }
}
