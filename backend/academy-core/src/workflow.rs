// src/workflow.rs
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cancellation::{
    make_up_dates, Actor, ApprovalCommit, ApprovalOutcome, CancellationRequest,
    CancellationStatus, NewCancellationRequest, DEFAULT_REJECTION_REASON,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{AcademyError, Result};
use crate::store::AcademyStore;

/// Approval, rejection and deletion of teacher cancellation requests.
///
/// Every mutation of a request runs while holding its class's lock, so two
/// approvals on one class observe each other's period length. Approvals also
/// hold the teacher's lock while debiting leave, taken after the class lock.
pub struct CancellationWorkflow<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Class(u64),
    Teacher(u64),
}

impl<S: AcademyStore> CancellationWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only the registry still references are neither held nor awaited.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) async fn registered_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    // Reads the request, takes its class lock, then re-reads it so the
    // returned copy is current for as long as the guard lives.
    async fn lock_request(
        &self,
        request_id: u64,
    ) -> Result<(OwnedMutexGuard<()>, CancellationRequest)> {
        let class_id = self.store.request(request_id).await?.class_id;
        let guard = self.lock(LockKey::Class(class_id)).await;
        let request = self.store.request(request_id).await?;
        Ok((guard, request))
    }

    /// File a new pending request. Every date must be today or later.
    pub async fn submit(
        &self,
        class_id: u64,
        teacher_id: u64,
        reason: &str,
        dates: Vec<NaiveDate>,
    ) -> Result<CancellationRequest> {
        if dates.is_empty() {
            return Err(AcademyError::Validation(
                "a cancellation request needs at least one date".to_string(),
            ));
        }
        let today = self.clock.today();
        if let Some(past) = dates.iter().find(|date| **date < today) {
            return Err(AcademyError::Validation(format!(
                "cancellation date {} is in the past",
                past
            )));
        }

        self.store.class(class_id).await?;
        self.store.teacher(teacher_id).await?;

        let request = self
            .store
            .insert_request(NewCancellationRequest {
                class_id,
                teacher_id,
                reason: reason.to_string(),
                dates,
            })
            .await?;
        info!(
            "Cancellation request {} submitted for class {} by teacher {} ({} dates)",
            request.id,
            class_id,
            teacher_id,
            request.dates.len()
        );
        Ok(request)
    }

    /// Approve a pending request: extend the class by one day per cancelled
    /// date, schedule the make-up dates and debit the teacher's leave.
    pub async fn approve(&self, request_id: u64, admin_id: u64) -> Result<ApprovalOutcome> {
        let (_guard, request) = self.lock_request(request_id).await?;
        if let Err(e) = request.ensure_pending("approve") {
            warn!("Refused approval by admin {}: {}", admin_id, e);
            return Err(e);
        }

        let class = self.store.class(request.class_id).await?;
        let (start_date, period_length) = match (class.start_date, class.period_length) {
            (Some(start), Some(length)) => (start, length),
            _ => {
                return Err(AcademyError::Validation(format!(
                    "class {} has no start date or period length configured",
                    class.id
                )))
            }
        };
        let _teacher_guard = self.lock(LockKey::Teacher(request.teacher_id)).await;
        let teacher = self.store.teacher(request.teacher_id).await?;

        let cancelled_days = request.dates.len();
        let make_up = make_up_dates(start_date, period_length, cancelled_days)?;
        let cancelled_days = u32::try_from(cancelled_days).unwrap_or(u32::MAX);
        let new_period_length = period_length.extended_by(cancelled_days);
        let (new_leave_balance, deducted) = teacher.leave.debit(cancelled_days);
        debug!(
            "Request {}: make-up dates {:?}, leave {:?} -> {:?}",
            request.id, make_up, teacher.leave, new_leave_balance
        );
        if deducted < cancelled_days {
            warn!(
                "Teacher {} leave balance covered {} of {} cancelled days",
                teacher.id, deducted, cancelled_days
            );
        }

        let approved = CancellationRequest {
            status: CancellationStatus::Approved,
            reviewed_at: Some(self.clock.now()),
            reviewed_by: Some(admin_id),
            make_up_dates: make_up.clone(),
            ..request
        };
        self.store
            .commit_approval(&ApprovalCommit {
                request: approved.clone(),
                expected_period_length: period_length,
                new_period_length,
                expected_leave_balance: teacher.leave,
                new_leave_balance,
            })
            .await?;

        info!(
            "Cancellation request {} approved by admin {}: class {} period length {} -> {}",
            approved.id, admin_id, approved.class_id, period_length, new_period_length
        );
        Ok(ApprovalOutcome {
            request: approved,
            new_period_length,
            make_up_dates: make_up,
            new_leave_balance,
            leave_days_deducted: deducted,
        })
    }

    /// Reject a pending request. A blank reason is recorded as the default.
    pub async fn reject(
        &self,
        request_id: u64,
        admin_id: u64,
        reason: Option<&str>,
    ) -> Result<CancellationRequest> {
        let (_guard, request) = self.lock_request(request_id).await?;
        if let Err(e) = request.ensure_pending("reject") {
            warn!("Refused rejection by admin {}: {}", admin_id, e);
            return Err(e);
        }

        let rejected_reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON)
            .to_string();
        let rejected = CancellationRequest {
            status: CancellationStatus::Rejected,
            rejected_reason: Some(rejected_reason),
            reviewed_at: Some(self.clock.now()),
            reviewed_by: Some(admin_id),
            ..request
        };
        self.store.commit_rejection(&rejected).await?;

        info!(
            "Cancellation request {} rejected by admin {}",
            rejected.id, admin_id
        );
        Ok(rejected)
    }

    /// Delete a request. Teachers may delete only their own rejected
    /// requests; administrators may delete any request.
    pub async fn delete(&self, request_id: u64, actor: Actor) -> Result<()> {
        let (_guard, request) = self.lock_request(request_id).await?;

        if let Actor::Teacher(teacher_id) = actor {
            if request.teacher_id != teacher_id {
                let e = AcademyError::Authorization(format!(
                    "teacher {} does not own cancellation request {}",
                    teacher_id, request.id
                ));
                warn!("Refused deletion: {}", e);
                return Err(e);
            }
            match request.status {
                CancellationStatus::Rejected => {}
                CancellationStatus::Pending | CancellationStatus::Approved => {
                    let e = AcademyError::StateConflict(format!(
                        "teachers may only delete rejected requests; request {} is {:?}",
                        request.id, request.status
                    ));
                    warn!("Refused deletion: {}", e);
                    return Err(e);
                }
            }
        }

        self.store.delete_request(request.id).await?;
        info!("Cancellation request {} deleted by {:?}", request.id, actor);
        Ok(())
    }
}
