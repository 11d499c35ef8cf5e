// src/workflow_tests.rs

#[cfg(test)]
mod tests {
    use crate::cancellation::*;
    use crate::clock::{Clock, FixedClock};
    use crate::error::ErrorKind;
    use crate::period::PeriodLength;
    use crate::store::{AcademyStore, InMemoryStore};
    use crate::workflow::CancellationWorkflow;
    use crate::Result;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    const CLASS_ID: u64 = 10;
    const TEACHER_ID: u64 = 20;
    const OTHER_TEACHER_ID: u64 = 21;
    const ADMIN_ID: u64 = 1;

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
    }

    fn len(days: u32) -> PeriodLength {
        PeriodLength::new(days).unwrap()
    }

    // --- Test Setup ---

    async fn setup_test_environment(
        leave: LeaveBalance,
    ) -> (CancellationWorkflow<InMemoryStore>, Arc<InMemoryStore>, FixedClock) {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_class(ClassRecord {
                id: CLASS_ID,
                start_date: Some(d("2024-01-01")),
                period_length: Some(len(30)),
                schedule_text: Some("월,수 10:00-12:00".to_string()),
            })
            .await;
        store.put_teacher(Teacher { id: TEACHER_ID, leave }).await;
        store
            .put_teacher(Teacher {
                id: OTHER_TEACHER_ID,
                leave: LeaveBalance::new(5, 5),
            })
            .await;

        let clock = FixedClock::on(d("2024-01-02"));
        let workflow = CancellationWorkflow::with_clock(store.clone(), Arc::new(clock.clone()));
        (workflow, store, clock)
    }

    async fn submit_dates(
        workflow: &CancellationWorkflow<InMemoryStore>,
        teacher_id: u64,
        dates: &[&str],
    ) -> CancellationRequest {
        workflow
            .submit(
                CLASS_ID,
                teacher_id,
                "academic conference",
                dates.iter().map(|s| d(s)).collect(),
            )
            .await
            .unwrap()
    }

    // --- Submission ---

    #[tokio::test]
    async fn test_submit_creates_pending_request() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10", "2024-01-12"]).await;

        assert_eq!(request.status, CancellationStatus::Pending);
        assert_eq!(request.dates, vec![d("2024-01-10"), d("2024-01-12")]);
        assert_eq!(store.request(request.id).await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_dates() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let err = workflow
            .submit(CLASS_ID, TEACHER_ID, "none", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_allows_today_but_not_past() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        assert!(workflow
            .submit(CLASS_ID, TEACHER_ID, "today", vec![d("2024-01-02")])
            .await
            .is_ok());

        let err = workflow
            .submit(CLASS_ID, TEACHER_ID, "late", vec![d("2024-01-05"), d("2024-01-01")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_submit_unknown_class_is_not_found() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let err = workflow
            .submit(999, TEACHER_ID, "x", vec![d("2024-01-10")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // --- Approval ---

    #[tokio::test]
    async fn test_approve_extends_period_and_schedules_make_up_dates() {
        let (workflow, store, clock) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10", "2024-01-12"]).await;
        clock.advance(Duration::hours(3));

        let outcome = workflow.approve(request.id, ADMIN_ID).await.unwrap();

        assert_eq!(outcome.new_period_length, len(32));
        assert_eq!(outcome.make_up_dates, vec![d("2024-01-31"), d("2024-02-01")]);
        assert_eq!(outcome.request.status, CancellationStatus::Approved);
        assert_eq!(outcome.request.reviewed_by, Some(ADMIN_ID));
        assert_eq!(outcome.request.reviewed_at, Some(clock.now()));
        assert_eq!(outcome.request.make_up_dates, outcome.make_up_dates);

        let class = store.class(CLASS_ID).await.unwrap();
        assert_eq!(class.period_length, Some(len(32)));
        assert_eq!(store.request(request.id).await.unwrap(), outcome.request);
    }

    #[tokio::test]
    async fn test_approve_spills_leave_into_monthly() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(2, 5)).await;
        let request =
            submit_dates(&workflow, TEACHER_ID, &["2024-01-10", "2024-01-11", "2024-01-12"]).await;

        let outcome = workflow.approve(request.id, ADMIN_ID).await.unwrap();

        assert_eq!(outcome.new_leave_balance, LeaveBalance::new(0, 4));
        assert_eq!(outcome.leave_days_deducted, 3);
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(0, 4)
        );
    }

    #[tokio::test]
    async fn test_approve_with_insufficient_leave_floors_at_zero() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(0, 1)).await;
        let request =
            submit_dates(&workflow, TEACHER_ID, &["2024-01-10", "2024-01-11", "2024-01-12"]).await;

        let outcome = workflow.approve(request.id, ADMIN_ID).await.unwrap();

        assert_eq!(outcome.new_leave_balance, LeaveBalance::new(0, 0));
        assert_eq!(outcome.leave_days_deducted, 1);
        // The class is still extended by every cancelled date.
        assert_eq!(outcome.new_period_length, len(33));
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(0, 0)
        );
    }

    #[tokio::test]
    async fn test_approve_twice_is_state_conflict_and_changes_nothing() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        workflow.approve(request.id, ADMIN_ID).await.unwrap();

        let err = workflow.approve(request.id, ADMIN_ID).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(31)));
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(4, 5)
        );
    }

    #[tokio::test]
    async fn test_approve_rejected_request_is_state_conflict() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        workflow.reject(request.id, ADMIN_ID, None).await.unwrap();

        let err = workflow.approve(request.id, ADMIN_ID).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(30)));
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(5, 5)
        );
    }

    #[tokio::test]
    async fn test_approve_without_start_date_is_validation_error() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        store
            .put_class(ClassRecord {
                id: CLASS_ID,
                start_date: None,
                period_length: Some(len(30)),
                schedule_text: None,
            })
            .await;

        let err = workflow.approve(request.id, ADMIN_ID).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.request(request.id).await.unwrap().is_pending());
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(5, 5)
        );
    }

    #[tokio::test]
    async fn test_approve_without_period_length_is_validation_error() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        store
            .put_class(ClassRecord {
                id: CLASS_ID,
                start_date: Some(d("2024-01-01")),
                period_length: None,
                schedule_text: None,
            })
            .await;

        let err = workflow.approve(request.id, ADMIN_ID).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(store.request(request.id).await.unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_approve_unknown_request_is_not_found() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let err = workflow.approve(404, ADMIN_ID).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_on_one_class_serialize() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(10, 10)).await;
        let first = submit_dates(&workflow, TEACHER_ID, &["2024-01-10", "2024-01-11"]).await;
        let second = submit_dates(&workflow, OTHER_TEACHER_ID, &["2024-01-15"]).await;

        let workflow = Arc::new(workflow);
        let handles: Vec<_> = [first.id, second.id]
            .into_iter()
            .map(|id| {
                let workflow = workflow.clone();
                tokio::spawn(async move { workflow.approve(id, ADMIN_ID).await })
            })
            .collect();

        let mut make_up = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            make_up.extend(outcome.make_up_dates);
        }

        // 30 + 2 + 1, whichever order the approvals ran in.
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(33)));
        let distinct: HashSet<_> = make_up.iter().copied().collect();
        assert_eq!(distinct.len(), 3, "make-up dates collided: {:?}", make_up);
        make_up.sort();
        assert_eq!(make_up, vec![d("2024-01-31"), d("2024-02-01"), d("2024-02-02")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_approvals_on_different_classes_are_independent() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(10, 10)).await;
        store
            .put_class(ClassRecord {
                id: CLASS_ID + 1,
                start_date: Some(d("2024-02-01")),
                period_length: Some(len(14)),
                schedule_text: None,
            })
            .await;
        let first = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let second = workflow
            .submit(CLASS_ID + 1, OTHER_TEACHER_ID, "trip", vec![d("2024-02-05")])
            .await
            .unwrap();

        let workflow = Arc::new(workflow);
        let (a, b) = tokio::join!(
            workflow.approve(first.id, ADMIN_ID),
            workflow.approve(second.id, ADMIN_ID)
        );

        assert_eq!(a.unwrap().make_up_dates, vec![d("2024-01-31")]);
        assert_eq!(b.unwrap().make_up_dates, vec![d("2024-02-15")]);
        assert_eq!(store.class(CLASS_ID + 1).await.unwrap().period_length, Some(len(15)));
    }

    #[tokio::test]
    async fn test_commit_refuses_stale_period_length() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;

        let stale = ApprovalCommit {
            request: CancellationRequest {
                status: CancellationStatus::Approved,
                ..request.clone()
            },
            expected_period_length: len(28),
            new_period_length: len(29),
            expected_leave_balance: LeaveBalance::new(5, 5),
            new_leave_balance: LeaveBalance::new(4, 5),
        };
        let err = store.commit_approval(&stale).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(30)));
        assert!(store.request(request.id).await.unwrap().is_pending());
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(5, 5)
        );
    }

    #[tokio::test]
    async fn test_commit_refuses_stale_leave_balance() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;

        let stale = ApprovalCommit {
            request: CancellationRequest {
                status: CancellationStatus::Approved,
                ..request.clone()
            },
            expected_period_length: len(30),
            new_period_length: len(31),
            expected_leave_balance: LeaveBalance::new(6, 5),
            new_leave_balance: LeaveBalance::new(5, 5),
        };
        let err = store.commit_approval(&stale).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(30)));
        assert!(store.request(request.id).await.unwrap().is_pending());
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(5, 5)
        );
    }

    // Holds every class lookup until two callers have made one, so both
    // approvals have passed their class reads before either debits leave.
    struct GatedStore {
        inner: Arc<InMemoryStore>,
        gate: Barrier,
    }

    #[async_trait]
    impl AcademyStore for GatedStore {
        async fn class(&self, class_id: u64) -> Result<ClassRecord> {
            self.gate.wait().await;
            self.inner.class(class_id).await
        }

        async fn teacher(&self, teacher_id: u64) -> Result<Teacher> {
            self.inner.teacher(teacher_id).await
        }

        async fn request(&self, request_id: u64) -> Result<CancellationRequest> {
            self.inner.request(request_id).await
        }

        async fn insert_request(
            &self,
            request: NewCancellationRequest,
        ) -> Result<CancellationRequest> {
            self.inner.insert_request(request).await
        }

        async fn delete_request(&self, request_id: u64) -> Result<()> {
            self.inner.delete_request(request_id).await
        }

        async fn commit_approval(&self, commit: &ApprovalCommit) -> Result<()> {
            self.inner.commit_approval(commit).await
        }

        async fn commit_rejection(&self, request: &CancellationRequest) -> Result<()> {
            self.inner.commit_rejection(request).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_approvals_for_one_teacher_debit_both() {
        let (workflow, store, clock) = setup_test_environment(LeaveBalance::new(10, 0)).await;
        store
            .put_class(ClassRecord {
                id: CLASS_ID + 1,
                start_date: Some(d("2024-02-01")),
                period_length: Some(len(14)),
                schedule_text: None,
            })
            .await;
        let first = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let second = workflow
            .submit(
                CLASS_ID + 1,
                TEACHER_ID,
                "trip",
                vec![d("2024-02-05"), d("2024-02-06")],
            )
            .await
            .unwrap();

        let gated = CancellationWorkflow::with_clock(
            Arc::new(GatedStore {
                inner: store.clone(),
                gate: Barrier::new(2),
            }),
            Arc::new(clock),
        );
        let (a, b) = tokio::join!(
            gated.approve(first.id, ADMIN_ID),
            gated.approve(second.id, ADMIN_ID)
        );

        let deducted = a.unwrap().leave_days_deducted + b.unwrap().leave_days_deducted;
        assert_eq!(deducted, 3);
        assert_eq!(
            store.teacher(TEACHER_ID).await.unwrap().leave,
            LeaveBalance::new(7, 0)
        );
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(31)));
        assert_eq!(store.class(CLASS_ID + 1).await.unwrap().period_length, Some(len(16)));
    }

    #[tokio::test]
    async fn test_lock_registry_drops_released_entries() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let first = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let second = submit_dates(&workflow, TEACHER_ID, &["2024-01-11"]).await;
        let third = submit_dates(&workflow, OTHER_TEACHER_ID, &["2024-01-12"]).await;

        workflow.approve(first.id, ADMIN_ID).await.unwrap();
        // Class and teacher entries from the approval remain until the next acquisition.
        assert_eq!(workflow.registered_locks().await, 2);

        workflow.reject(second.id, ADMIN_ID, None).await.unwrap();
        workflow.reject(third.id, ADMIN_ID, None).await.unwrap();
        assert_eq!(workflow.registered_locks().await, 1);
    }

    // --- Rejection ---

    #[tokio::test]
    async fn test_reject_records_reason_and_reviewer() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;

        let rejected = workflow
            .reject(request.id, ADMIN_ID, Some("exam week"))
            .await
            .unwrap();

        assert_eq!(rejected.status, CancellationStatus::Rejected);
        assert_eq!(rejected.rejected_reason.as_deref(), Some("exam week"));
        assert_eq!(rejected.reviewed_by, Some(ADMIN_ID));
        assert!(rejected.reviewed_at.is_some());
        assert_eq!(store.request(request.id).await.unwrap(), rejected);
        assert_eq!(store.class(CLASS_ID).await.unwrap().period_length, Some(len(30)));
    }

    #[tokio::test]
    async fn test_reject_without_reason_uses_default() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let first = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let second = submit_dates(&workflow, TEACHER_ID, &["2024-01-11"]).await;

        let none = workflow.reject(first.id, ADMIN_ID, None).await.unwrap();
        let blank = workflow.reject(second.id, ADMIN_ID, Some("   ")).await.unwrap();

        assert_eq!(none.rejected_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
        assert_eq!(blank.rejected_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
    }

    #[tokio::test]
    async fn test_reject_approved_request_is_state_conflict() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let approved = workflow.approve(request.id, ADMIN_ID).await.unwrap().request;

        let err = workflow.reject(request.id, ADMIN_ID, None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(store.request(request.id).await.unwrap(), approved);
    }

    // --- Deletion ---

    #[tokio::test]
    async fn test_teacher_deletes_own_rejected_request() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        workflow.reject(request.id, ADMIN_ID, None).await.unwrap();

        workflow
            .delete(request.id, Actor::Teacher(TEACHER_ID))
            .await
            .unwrap();

        assert_eq!(
            store.request(request.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_teacher_cannot_delete_another_teachers_request() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let request = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        workflow.reject(request.id, ADMIN_ID, None).await.unwrap();

        let err = workflow
            .delete(request.id, Actor::Teacher(OTHER_TEACHER_ID))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(store.request(request.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_teacher_cannot_delete_pending_or_approved_request() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let pending = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let approved = submit_dates(&workflow, TEACHER_ID, &["2024-01-11"]).await;
        workflow.approve(approved.id, ADMIN_ID).await.unwrap();

        for id in [pending.id, approved.id] {
            let err = workflow
                .delete(id, Actor::Teacher(TEACHER_ID))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StateConflict);
            assert!(store.request(id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_administrator_deletes_any_request() {
        let (workflow, store, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let pending = submit_dates(&workflow, TEACHER_ID, &["2024-01-10"]).await;
        let approved = submit_dates(&workflow, TEACHER_ID, &["2024-01-11"]).await;
        workflow.approve(approved.id, ADMIN_ID).await.unwrap();

        for id in [pending.id, approved.id] {
            workflow
                .delete(id, Actor::Administrator(ADMIN_ID))
                .await
                .unwrap();
        }
        assert!(store.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_request_is_not_found() {
        let (workflow, _, _) = setup_test_environment(LeaveBalance::new(5, 5)).await;
        let err = workflow
            .delete(404, Actor::Administrator(ADMIN_ID))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
