//! Calendar-month arithmetic for timed activations.
//!
//! Adding N months keeps the time of day and the day of month. When the day
//! does not exist in the target month (Jan 31 + 1 month) the outcome depends
//! on [`MonthOverflow`]:
//!
//! - `RollOver` (default): excess days spill into the following month, so
//!   Jan 31 + 1 month is Mar 2 in a leap year and Mar 3 otherwise. Tokens
//!   issued by the legacy deployment were computed this way.
//! - `Clamp`: the date is pinned to the last day of the target month
//!   (Jan 31 + 1 month is Feb 29 / Feb 28).
//!
//! All arithmetic is done in UTC.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonthOverflow {
    #[default]
    #[serde(alias = "roll_over")]
    RollOver,
    Clamp,
}

impl std::str::FromStr for MonthOverflow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rollover" | "roll_over" | "roll-over" => Ok(MonthOverflow::RollOver),
            "clamp" => Ok(MonthOverflow::Clamp),
            other => anyhow::bail!(
                "unknown month overflow policy '{}'. Must be 'rollover' or 'clamp'",
                other
            ),
        }
    }
}

/// `at + months` calendar months. Returns `None` if the result is out of range.
pub fn add_months(at: DateTime<Utc>, months: u32, policy: MonthOverflow) -> Option<DateTime<Utc>> {
    match policy {
        MonthOverflow::Clamp => at.checked_add_months(Months::new(months)),
        MonthOverflow::RollOver => {
            let first = NaiveDate::from_ymd_opt(at.year(), at.month(), 1)?
                .checked_add_months(Months::new(months))?;
            let date = first.checked_add_days(Days::new(u64::from(at.day() - 1)))?;
            Some(Utc.from_utc_datetime(&date.and_time(at.time())))
        }
    }
}
