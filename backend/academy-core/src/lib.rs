// src/lib.rs
//! Period arithmetic, attendance accounting, schedule conflict detection and
//! the cancellation approval workflow for academy classes.
//!
//! Nothing here persists data or checks roles. Callers hand in records,
//! resolved configuration and an [`AcademyStore`] implementation.

pub mod attendance;
pub mod cancellation;
pub mod clock;
pub mod config;
pub mod error;
pub mod period;
pub mod schedule;
pub mod store;
pub mod workflow;

pub use attendance::{
    events_in_period, summarize, AbsenceStanding, AttendanceEvent, AttendanceStatus,
    AttendanceSummary,
};
pub use cancellation::{
    make_up_dates, original_period_end, Actor, ApprovalCommit, ApprovalOutcome,
    CancellationRequest, CancellationStatus, ClassRecord, LeaveBalance, NewCancellationRequest,
    Teacher,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AbsencePolicy, EngineConfig, PeriodBounds};
pub use error::{AcademyError, ErrorKind, Result};
pub use period::{
    current_period, next_period, period_by_number, period_for, period_history, Period,
    PeriodLength,
};
pub use schedule::{conflicts, find_conflict, ScheduleWindow};
pub use store::{AcademyStore, InMemoryStore};
pub use workflow::CancellationWorkflow;

mod workflow_tests;
