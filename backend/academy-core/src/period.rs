// src/period.rs
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::Clock;
use crate::error::{AcademyError, Result};

// --- Period Length ---

/// Number of days in one period. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PeriodLength(u32);

impl PeriodLength {
    pub fn new(days: u32) -> Result<Self> {
        if days < 1 {
            return Err(AcademyError::Validation(
                "period length must be at least 1 day".to_string(),
            ));
        }
        Ok(Self(days))
    }

    pub fn days(self) -> u32 {
        self.0
    }

    /// Length extended by `extra` days, saturating at `u32::MAX`.
    pub fn extended_by(self, extra: u32) -> Self {
        Self(self.0.saturating_add(extra))
    }
}

impl TryFrom<u32> for PeriodLength {
    type Error = AcademyError;

    fn try_from(days: u32) -> Result<Self> {
        Self::new(days)
    }
}

impl From<PeriodLength> for u32 {
    fn from(length: PeriodLength) -> u32 {
        length.0
    }
}

impl fmt::Display for PeriodLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days", self.0)
    }
}

// --- Period ---

/// A contiguous, inclusive window of `PeriodLength` days anchored at a class start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub period_number: u32,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.period_start <= date && date <= self.period_end
    }

    /// Display label, e.g. `3기간 (2024-03-01 ~ 2024-03-30)`.
    pub fn label(&self) -> String {
        format!(
            "{}기간 ({} ~ {})",
            self.period_number,
            self.period_start.format("%Y-%m-%d"),
            self.period_end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// Last day of a period starting on `start`. Saturates at the end of the calendar.
fn last_day(start: NaiveDate, length: PeriodLength) -> NaiveDate {
    start
        .checked_add_days(Days::new(u64::from(length.days()) - 1))
        .unwrap_or(NaiveDate::MAX)
}

// --- Calculations ---

/// Period containing `target`.
///
/// Without a start date, period 1 begins on `target` itself. A target before
/// the start date falls into period 1 beginning on the start date.
pub fn period_for(
    start_date: Option<NaiveDate>,
    length: PeriodLength,
    target: NaiveDate,
) -> Period {
    let start = match start_date {
        Some(start) => start,
        None => {
            return Period {
                period_start: target,
                period_end: last_day(target, length),
                period_number: 1,
            }
        }
    };

    if target < start {
        return Period {
            period_start: start,
            period_end: last_day(start, length),
            period_number: 1,
        };
    }

    let days_since_start = (target - start).num_days() as u64;
    let len = u64::from(length.days());
    let index = days_since_start / len;
    // index * len <= days_since_start, so the start is always a valid date
    let period_start = start + Days::new(index * len);

    Period {
        period_start,
        period_end: last_day(period_start, length),
        period_number: u32::try_from(index + 1).unwrap_or(u32::MAX),
    }
}

/// Period containing the clock's current day.
pub fn current_period(
    start_date: Option<NaiveDate>,
    length: PeriodLength,
    clock: &dyn Clock,
) -> Period {
    period_for(start_date, length, clock.today())
}

/// Closed-form bounds of period `period_number`.
///
/// Returns `None` for period 0 or when the period starts past the
/// representable calendar.
pub fn period_by_number(
    start_date: NaiveDate,
    length: PeriodLength,
    period_number: u32,
) -> Option<Period> {
    if period_number < 1 {
        return None;
    }
    let offset = u64::from(period_number - 1).checked_mul(u64::from(length.days()))?;
    let period_start = start_date.checked_add_days(Days::new(offset))?;
    Some(Period {
        period_start,
        period_end: last_day(period_start, length),
        period_number,
    })
}

/// The period immediately after `period`, for "next period" previews.
pub fn next_period(period: &Period, length: PeriodLength) -> Option<Period> {
    let period_start = period.period_end.checked_add_days(Days::new(1))?;
    Some(Period {
        period_start,
        period_end: last_day(period_start, length),
        period_number: period.period_number.checked_add(1)?,
    })
}

/// Periods `1..=through_number`, oldest first.
pub fn period_history(
    start_date: NaiveDate,
    length: PeriodLength,
    through_number: u32,
) -> Vec<Period> {
    (1..=through_number)
        .map_while(|number| period_by_number(start_date, length, number))
        .collect()
}
