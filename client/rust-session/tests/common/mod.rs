#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use assignment_session::{
    Assignment, AssignmentStatus, AutosavePolicy, LeaveReason, LoadedAssignment,
    PersistenceClient, PersistenceError, RetryConfig, SaveReceipt, SessionNavigator,
    SubmitReceipt,
};

/// In-memory persistence collaborator that records every call, can be primed
/// with failures, and tracks how many calls were ever in flight at once.
pub struct FakePersistence {
    status: AssignmentStatus,
    initial_content: String,
    load_error: Mutex<Option<PersistenceError>>,
    save_errors: Mutex<VecDeque<PersistenceError>>,
    submit_errors: Mutex<VecDeque<PersistenceError>>,
    op_delay: Duration,
    saved: Mutex<Vec<String>>,
    submitted: Mutex<Vec<(String, String)>>,
    save_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePersistence {
    fn new(content: &str, status: AssignmentStatus) -> Self {
        Self {
            status,
            initial_content: content.to_string(),
            load_error: Mutex::new(None),
            save_errors: Mutex::new(VecDeque::new()),
            submit_errors: Mutex::new(VecDeque::new()),
            op_delay: Duration::ZERO,
            saved: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            save_attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_draft(content: &str) -> Self {
        Self::new(content, AssignmentStatus::InProgress)
    }

    pub fn completed(content: &str) -> Self {
        Self::new(content, AssignmentStatus::Completed)
    }

    pub fn failing_load(error: PersistenceError) -> Self {
        let fake = Self::new("", AssignmentStatus::InProgress);
        *fake.load_error.lock().unwrap() = Some(error);
        fake
    }

    /// Makes every save/submit take this long, so tests can observe calls
    /// while they are in flight.
    pub fn with_op_delay(mut self, delay: Duration) -> Self {
        self.op_delay = delay;
        self
    }

    pub fn queue_save_error(&self, error: PersistenceError) {
        self.save_errors.lock().unwrap().push_back(error);
    }

    pub fn queue_submit_error(&self, error: PersistenceError) {
        self.submit_errors.lock().unwrap().push_back(error);
    }

    pub fn saved_contents(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }

    /// Every submit attempt as `(content, idempotency_key)`, failures
    /// included.
    pub fn submit_attempts(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PersistenceClient for FakePersistence {
    async fn load_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<LoadedAssignment, PersistenceError> {
        if let Some(error) = self.load_error.lock().unwrap().take() {
            return Err(error);
        }

        Ok(LoadedAssignment {
            assignment: Assignment {
                assignment_id: assignment_id.to_string(),
                pdf_path: format!("/files/{}.pdf", assignment_id),
                status: self.status,
            },
            content: self.initial_content.clone(),
            last_saved_at: Some(Utc::now()),
        })
    }

    async fn save_content(
        &self,
        _assignment_id: &str,
        content: &str,
    ) -> Result<SaveReceipt, PersistenceError> {
        self.enter();
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }

        let result = match self.save_errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => {
                self.saved.lock().unwrap().push(content.to_string());
                Ok(SaveReceipt {
                    saved_at: Utc::now(),
                })
            }
        };

        self.exit();
        result
    }

    async fn submit_assignment(
        &self,
        _assignment_id: &str,
        content: &str,
        idempotency_key: &str,
    ) -> Result<SubmitReceipt, PersistenceError> {
        self.enter();
        if !self.op_delay.is_zero() {
            tokio::time::sleep(self.op_delay).await;
        }

        self.submitted
            .lock()
            .unwrap()
            .push((content.to_string(), idempotency_key.to_string()));
        let result = match self.submit_errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(SubmitReceipt {
                completed_at: Utc::now(),
            }),
        };

        self.exit();
        result
    }
}

/// Navigation collaborator that just records why it was asked to leave.
#[derive(Default)]
pub struct RecordingNavigator {
    reasons: Mutex<Vec<LeaveReason>>,
}

impl RecordingNavigator {
    pub fn reasons(&self) -> Vec<LeaveReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl SessionNavigator for RecordingNavigator {
    fn leave_session(&self, reason: LeaveReason) {
        self.reasons.lock().unwrap().push(reason);
    }
}

/// Autosave policy small enough for paused-clock tests.
pub fn fast_policy() -> AutosavePolicy {
    AutosavePolicy {
        debounce: Duration::from_secs(2),
        max_wait: Duration::from_secs(5),
        force_save_bytes: 64 * 1024,
    }
}

/// Deterministic retry config: two attempts, no jitter.
pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_backoff: Duration::from_millis(100),
        max_backoff: Duration::from_secs(1),
        jitter_max: None,
    }
}
