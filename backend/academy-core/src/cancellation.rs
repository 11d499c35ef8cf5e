// src/cancellation.rs
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AcademyError, Result};
use crate::period::PeriodLength;

pub const DEFAULT_REJECTION_REASON: &str = "no reason given";

// --- Class & Teacher Records ---

/// The slice of a class record this engine reads and mutates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: u64,
    pub start_date: Option<NaiveDate>,
    pub period_length: Option<PeriodLength>,
    pub schedule_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBalance {
    pub annual_leave_days: u32,
    pub monthly_leave_days: u32,
}

impl LeaveBalance {
    pub fn new(annual_leave_days: u32, monthly_leave_days: u32) -> Self {
        Self {
            annual_leave_days,
            monthly_leave_days,
        }
    }

    pub fn total(&self) -> u32 {
        self.annual_leave_days.saturating_add(self.monthly_leave_days)
    }

    /// Takes `days` from annual leave first, then monthly. Neither field goes
    /// below zero, so less than `days` may be taken; the second value is the
    /// amount actually deducted.
    pub fn debit(self, days: u32) -> (LeaveBalance, u32) {
        let from_annual = days.min(self.annual_leave_days);
        let from_monthly = (days - from_annual).min(self.monthly_leave_days);
        let balance = LeaveBalance {
            annual_leave_days: self.annual_leave_days - from_annual,
            monthly_leave_days: self.monthly_leave_days - from_monthly,
        };
        (balance, from_annual + from_monthly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: u64,
    #[serde(flatten)]
    pub leave: LeaveBalance,
}

// --- Cancellation Requests ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    pub id: u64,
    pub class_id: u64,
    pub teacher_id: u64,
    pub reason: String,
    /// Cancelled class days, in submission order.
    pub dates: Vec<NaiveDate>,
    pub status: CancellationStatus,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_by: Option<u64>,
    /// Filled in on approval, one per cancelled date.
    #[serde(default)]
    pub make_up_dates: Vec<NaiveDate>,
}

impl CancellationRequest {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, CancellationStatus::Pending)
    }

    pub(crate) fn ensure_pending(&self, action: &str) -> Result<()> {
        match self.status {
            CancellationStatus::Pending => Ok(()),
            CancellationStatus::Approved | CancellationStatus::Rejected => {
                Err(AcademyError::StateConflict(format!(
                    "cannot {} cancellation request {}: status is {:?}",
                    action, self.id, self.status
                )))
            }
        }
    }
}

/// A request as submitted, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCancellationRequest {
    pub class_id: u64,
    pub teacher_id: u64,
    pub reason: String,
    pub dates: Vec<NaiveDate>,
}

impl NewCancellationRequest {
    pub fn into_request(self, id: u64) -> CancellationRequest {
        CancellationRequest {
            id,
            class_id: self.class_id,
            teacher_id: self.teacher_id,
            reason: self.reason,
            dates: self.dates,
            status: CancellationStatus::Pending,
            rejected_reason: None,
            reviewed_at: None,
            reviewed_by: None,
            make_up_dates: Vec::new(),
        }
    }
}

/// Who is asking for a mutation. Role checks happen upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Teacher(u64),
    Administrator(u64),
}

// --- Make-up Dates ---

/// `start_date + length` days: the first day after the period's natural last
/// day, and the first make-up date.
pub fn original_period_end(start_date: NaiveDate, length: PeriodLength) -> Result<NaiveDate> {
    start_date
        .checked_add_days(Days::new(u64::from(length.days())))
        .ok_or_else(|| {
            AcademyError::Validation("period end is past the supported calendar".to_string())
        })
}

/// Consecutive calendar days starting at the original period end, one per
/// cancelled date. They fill exactly the days an approval adds to the
/// period. Weekends and holidays are not skipped.
pub fn make_up_dates(
    start_date: NaiveDate,
    length: PeriodLength,
    count: usize,
) -> Result<Vec<NaiveDate>> {
    let period_end = original_period_end(start_date, length)?;
    (0..count as u64)
        .map(|offset| {
            period_end.checked_add_days(Days::new(offset)).ok_or_else(|| {
                AcademyError::Validation("make-up date is past the supported calendar".to_string())
            })
        })
        .collect()
}

// --- Commit Payloads ---

/// Everything an approval writes. A store applies all of it or none of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalCommit {
    /// The request in its approved state.
    pub request: CancellationRequest,
    /// Period length the computation was seeded from; the commit is refused
    /// if the class no longer has it.
    pub expected_period_length: PeriodLength,
    pub new_period_length: PeriodLength,
    /// Leave balance the debit was computed from; checked the same way.
    pub expected_leave_balance: LeaveBalance,
    pub new_leave_balance: LeaveBalance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub request: CancellationRequest,
    pub new_period_length: PeriodLength,
    pub make_up_dates: Vec<NaiveDate>,
    pub new_leave_balance: LeaveBalance,
    pub leave_days_deducted: u32,
}
