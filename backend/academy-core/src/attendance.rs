// src/attendance.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::AbsencePolicy;
use crate::period::Period;

/// Late arrivals that add up to one absence for warning purposes.
pub const LATES_PER_ABSENCE: u32 = 3;

// --- Attendance Structures ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    SickLeave,
    Vacation,
    EarlyLeave,
}

/// One day's attendance for one student in one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

impl AttendanceEvent {
    pub fn new(date: NaiveDate, status: AttendanceStatus) -> Self {
        Self { date, status }
    }
}

/// Aggregated attendance over a caller-chosen window.
///
/// `absent` is the raw count and feeds nothing but display. `adjusted_absent`
/// also counts one absence per three lates and is the only figure warning
/// thresholds may use. `rate` treats lates as present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub sick_leave: u32,
    pub vacation: u32,
    pub early_leave: u32,
    pub late_to_absent: u32,
    pub adjusted_absent: u32,
    pub effective_present: u32,
    pub rate: u32,
}

/// Summarize an already date-bounded set of events.
pub fn summarize<'a, I>(events: I) -> AttendanceSummary
where
    I: IntoIterator<Item = &'a AttendanceEvent>,
{
    let mut summary = AttendanceSummary::default();

    for event in events {
        summary.total += 1;
        match event.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
            AttendanceStatus::SickLeave => summary.sick_leave += 1,
            AttendanceStatus::Vacation => summary.vacation += 1,
            AttendanceStatus::EarlyLeave => summary.early_leave += 1,
        }
    }

    summary.late_to_absent = summary.late / LATES_PER_ABSENCE;
    summary.adjusted_absent = summary.absent + summary.late_to_absent;
    summary.effective_present = summary.present + summary.late;
    summary.rate = attendance_rate(summary.effective_present, summary.total);
    summary
}

// No data counts as perfect attendance so unstarted periods read 100%.
fn attendance_rate(effective_present: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    (f64::from(effective_present) / f64::from(total) * 100.0).round() as u32
}

/// Events dated inside `period`, bounds inclusive.
pub fn events_in_period<'a>(
    events: &'a [AttendanceEvent],
    period: Period,
) -> impl Iterator<Item = &'a AttendanceEvent> + 'a {
    events.iter().filter(move |event| period.contains(event.date))
}

// --- Absence Standing ---

/// Where a student stands against the allowed-absence policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceStanding {
    pub adjusted_absent: u32,
    pub remaining_absent: u32,
    pub warning: bool,
}

impl AbsenceStanding {
    pub fn evaluate(summary: &AttendanceSummary, policy: &AbsencePolicy) -> Self {
        let adjusted_absent = summary.adjusted_absent;
        Self {
            adjusted_absent,
            remaining_absent: policy.allowed_absences.saturating_sub(adjusted_absent),
            warning: adjusted_absent >= policy.warning_threshold,
        }
    }
}
