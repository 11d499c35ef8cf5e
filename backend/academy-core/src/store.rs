// src/store.rs
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::cancellation::{
    ApprovalCommit, CancellationRequest, CancellationStatus, ClassRecord, NewCancellationRequest,
    Teacher,
};
use crate::error::{AcademyError, Result};

/// What the approval workflow needs from persistence.
///
/// The commit methods are the transactional boundary: each either applies
/// every write it describes or leaves the store untouched.
#[async_trait]
pub trait AcademyStore: Send + Sync {
    async fn class(&self, class_id: u64) -> Result<ClassRecord>;

    async fn teacher(&self, teacher_id: u64) -> Result<Teacher>;

    async fn request(&self, request_id: u64) -> Result<CancellationRequest>;

    async fn insert_request(&self, request: NewCancellationRequest) -> Result<CancellationRequest>;

    async fn delete_request(&self, request_id: u64) -> Result<()>;

    /// Extend the class, debit the teacher and mark the request approved.
    ///
    /// Refuses with `StateConflict` if the request is no longer pending, the
    /// class period length differs from `expected_period_length`, or the
    /// teacher's balance differs from `expected_leave_balance`.
    async fn commit_approval(&self, commit: &ApprovalCommit) -> Result<()>;

    /// Store a rejected request. Refuses with `StateConflict` if the stored
    /// request is no longer pending.
    async fn commit_rejection(&self, request: &CancellationRequest) -> Result<()>;
}

// --- In-Memory Store ---

#[derive(Debug, Default)]
struct StoreState {
    classes: HashMap<u64, ClassRecord>,
    teachers: HashMap<u64, Teacher>,
    requests: BTreeMap<u64, CancellationRequest>,
    next_request_id: u64,
}

/// Single-lock store for tests and the operator tool. Every commit runs under
/// one lock acquisition, which makes it atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_class(&self, class: ClassRecord) {
        self.state.lock().await.classes.insert(class.id, class);
    }

    pub async fn put_teacher(&self, teacher: Teacher) {
        self.state.lock().await.teachers.insert(teacher.id, teacher);
    }

    pub async fn requests(&self) -> Vec<CancellationRequest> {
        self.state.lock().await.requests.values().cloned().collect()
    }
}

#[async_trait]
impl AcademyStore for InMemoryStore {
    async fn class(&self, class_id: u64) -> Result<ClassRecord> {
        self.state
            .lock()
            .await
            .classes
            .get(&class_id)
            .cloned()
            .ok_or_else(|| AcademyError::class_not_found(class_id))
    }

    async fn teacher(&self, teacher_id: u64) -> Result<Teacher> {
        self.state
            .lock()
            .await
            .teachers
            .get(&teacher_id)
            .cloned()
            .ok_or_else(|| AcademyError::teacher_not_found(teacher_id))
    }

    async fn request(&self, request_id: u64) -> Result<CancellationRequest> {
        self.state
            .lock()
            .await
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| AcademyError::request_not_found(request_id))
    }

    async fn insert_request(&self, request: NewCancellationRequest) -> Result<CancellationRequest> {
        let mut state = self.state.lock().await;
        state.next_request_id += 1;
        let request = request.into_request(state.next_request_id);
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn delete_request(&self, request_id: u64) -> Result<()> {
        self.state
            .lock()
            .await
            .requests
            .remove(&request_id)
            .map(|_| ())
            .ok_or_else(|| AcademyError::request_not_found(request_id))
    }

    async fn commit_approval(&self, commit: &ApprovalCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        let request = &commit.request;

        // Check everything before writing anything.
        state
            .requests
            .get(&request.id)
            .ok_or_else(|| AcademyError::request_not_found(request.id))?
            .ensure_pending("approve")?;
        let class = state
            .classes
            .get(&request.class_id)
            .ok_or_else(|| AcademyError::class_not_found(request.class_id))?;
        if class.period_length != Some(commit.expected_period_length) {
            return Err(AcademyError::StateConflict(format!(
                "class {} period length changed during approval of request {}",
                request.class_id, request.id
            )));
        }
        let teacher = state
            .teachers
            .get(&request.teacher_id)
            .ok_or_else(|| AcademyError::teacher_not_found(request.teacher_id))?;
        if teacher.leave != commit.expected_leave_balance {
            return Err(AcademyError::StateConflict(format!(
                "teacher {} leave balance changed during approval of request {}",
                request.teacher_id, request.id
            )));
        }

        if let Some(class) = state.classes.get_mut(&request.class_id) {
            class.period_length = Some(commit.new_period_length);
        }
        if let Some(teacher) = state.teachers.get_mut(&request.teacher_id) {
            teacher.leave = commit.new_leave_balance;
        }
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn commit_rejection(&self, request: &CancellationRequest) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| AcademyError::request_not_found(request.id))?;
        stored.ensure_pending("reject")?;
        debug_assert!(matches!(request.status, CancellationStatus::Rejected));
        *stored = request.clone();
        Ok(())
    }
}
