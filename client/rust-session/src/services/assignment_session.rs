use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::metrics::{
    DRAFT_SAVES_TOTAL, SESSIONS_ACTIVE, SESSIONS_OPENED_TOTAL, STALE_WRITES_TOTAL,
    SUBMISSIONS_TOTAL,
};
use crate::models::{Assignment, AssignmentStatus, SessionPhase};
use crate::services::autosave::{self, AutosavePolicy, AutosaveTimer};
use crate::services::navigation::{LeaveReason, SessionNavigator};
use crate::services::persistence::{PersistenceClient, PersistenceError};
use crate::utils::retry::RetryConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load assignment: {0}")]
    Load(PersistenceError),
    #[error("failed to save draft: {0}")]
    Save(PersistenceError),
    #[error("failed to submit assignment: {0}")]
    Submit(PersistenceError),
}

/// What initiated a draft save. Only used for logging and metric labels.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SaveTrigger {
    Manual,
    Autosave,
    SubmitFlush,
}

impl SaveTrigger {
    fn as_str(self) -> &'static str {
        match self {
            SaveTrigger::Manual => "manual",
            SaveTrigger::Autosave => "autosave",
            SaveTrigger::SubmitFlush => "submit_flush",
        }
    }
}

/// One learner's editing session over one assignment: the single source of
/// truth for the response content and the save/submit state machine.
///
/// The struct itself is single-owner (`&mut self` operations); wrap it in a
/// [`SessionHandle`] to drive it from an editor callback plus the autosave
/// worker. Because every operation needs the one `&mut` borrow, at most one
/// persistence call can ever be outstanding.
pub struct AssignmentSession {
    assignment_id: String,
    assignment: Option<Assignment>,
    content: String,
    phase: SessionPhase,
    dirty: bool,
    last_saved_at: Option<DateTime<Utc>>,
    error_detail: Option<SessionError>,
    closed: bool,
    /// Generated once per session on the first submit attempt and reused on
    /// retries, so a submission whose response was lost cannot complete the
    /// assignment twice.
    submit_key: Option<String>,
    policy: AutosavePolicy,
    timer: AutosaveTimer,
    deadline_tx: watch::Sender<Option<Instant>>,
    persistence: Arc<dyn PersistenceClient>,
    navigator: Arc<dyn SessionNavigator>,
}

impl AssignmentSession {
    /// Loads the assignment and its last-persisted response. Always yields a
    /// session: on load failure the session is in the `Error` phase and the
    /// navigation collaborator has already been told to leave the screen.
    ///
    /// An assignment the server reports as already completed opens straight
    /// into `Locked`: viewable, never editable.
    pub async fn open(
        assignment_id: impl Into<String>,
        persistence: Arc<dyn PersistenceClient>,
        navigator: Arc<dyn SessionNavigator>,
        policy: AutosavePolicy,
    ) -> Self {
        let (deadline_tx, _) = watch::channel(None);
        let mut session = Self {
            assignment_id: assignment_id.into(),
            assignment: None,
            content: String::new(),
            phase: SessionPhase::Loading,
            dirty: false,
            last_saved_at: None,
            error_detail: None,
            closed: false,
            submit_key: None,
            policy,
            timer: AutosaveTimer::default(),
            deadline_tx,
            persistence,
            navigator,
        };

        tracing::info!(
            "Opening editing session for assignment {}",
            session.assignment_id
        );

        let loaded = session
            .persistence
            .load_assignment(&session.assignment_id)
            .await;

        match loaded {
            Ok(loaded) => {
                session.content = loaded.content;
                session.last_saved_at = loaded.last_saved_at;
                session.phase = if loaded.assignment.status == AssignmentStatus::Completed {
                    SessionPhase::Locked
                } else {
                    SessionPhase::Ready
                };
                session.assignment = Some(loaded.assignment);

                SESSIONS_OPENED_TOTAL.with_label_values(&["opened"]).inc();
                SESSIONS_ACTIVE.inc();
                tracing::info!(
                    "Assignment {} loaded ({:?}, {} bytes of draft)",
                    session.assignment_id,
                    session.phase,
                    session.content.len()
                );
            }
            Err(err) => {
                tracing::error!(
                    "Failed to load assignment {}: {}",
                    session.assignment_id,
                    err
                );
                SESSIONS_OPENED_TOTAL
                    .with_label_values(&["load_failed"])
                    .inc();
                session.phase = SessionPhase::Error;
                session.error_detail = Some(SessionError::Load(err));
                session.navigator.leave_session(LeaveReason::LoadError);
            }
        }

        session
    }

    /// Replaces the in-memory response and arms the autosave timer. Edits
    /// arriving while the session no longer accepts them (locked, submitting,
    /// errored, closed) are dropped without complaint: the editor is expected
    /// to be disabled by then, but a late callback must not corrupt state.
    pub fn update_content(&mut self, content: impl Into<String>) {
        if self.closed {
            return;
        }
        if self.phase != SessionPhase::Ready {
            STALE_WRITES_TOTAL.with_label_values(&["edit"]).inc();
            tracing::debug!(
                "Dropping edit for assignment {} while {:?}",
                self.assignment_id,
                self.phase
            );
            return;
        }

        self.content = content.into();
        self.dirty = true;

        let now = Instant::now();
        if self.content.len() >= self.policy.force_save_bytes {
            self.timer.force(now);
        } else {
            self.timer.record_edit(&self.policy, now);
        }
        self.deadline_tx.send_replace(self.timer.deadline());
    }

    /// Manual save. A no-op when there is nothing to save; never issues a
    /// redundant persistence call.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        self.save_with_trigger(SaveTrigger::Manual).await
    }

    pub(crate) async fn save_with_trigger(
        &mut self,
        trigger: SaveTrigger,
    ) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        if self.phase != SessionPhase::Ready {
            STALE_WRITES_TOTAL.with_label_values(&["save"]).inc();
            tracing::debug!(
                "Ignoring {} save for assignment {} while {:?}",
                trigger.as_str(),
                self.assignment_id,
                self.phase
            );
            self.disarm_autosave();
            return Ok(());
        }
        if !self.dirty {
            self.disarm_autosave();
            return Ok(());
        }

        self.phase = SessionPhase::Saving;
        let result = self
            .persistence
            .save_content(&self.assignment_id, &self.content)
            .await;
        self.phase = SessionPhase::Ready;

        match result {
            Ok(receipt) => {
                self.dirty = false;
                // Server clocks may skew; never let the timestamp go back.
                self.last_saved_at = Some(
                    self.last_saved_at
                        .map_or(receipt.saved_at, |prev| prev.max(receipt.saved_at)),
                );
                self.disarm_autosave();
                DRAFT_SAVES_TOTAL
                    .with_label_values(&[trigger.as_str(), "success"])
                    .inc();
                tracing::info!(
                    "Draft saved for assignment {} at {} ({})",
                    self.assignment_id,
                    receipt.saved_at,
                    trigger.as_str()
                );
                Ok(())
            }
            Err(err) => {
                DRAFT_SAVES_TOTAL
                    .with_label_values(&[trigger.as_str(), "failure"])
                    .inc();
                tracing::warn!(
                    "Draft save failed for assignment {} ({}): {}",
                    self.assignment_id,
                    trigger.as_str(),
                    err
                );
                // Edits stay in memory and dirty stays set: the learner can
                // retry or just keep typing.
                Err(SessionError::Save(err))
            }
        }
    }

    /// One-way submission. Flushes any unsaved edits first (a submission
    /// must never discard work), then locks the session and asks the host to
    /// leave the screen. On failure nothing is locked and the session is
    /// exactly as editable as before.
    ///
    /// The caller owns the irreversibility confirmation; by the time this
    /// runs the learner has already agreed.
    pub async fn submit(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        if self.phase != SessionPhase::Ready {
            STALE_WRITES_TOTAL.with_label_values(&["submit"]).inc();
            tracing::debug!(
                "Ignoring submit for assignment {} while {:?}",
                self.assignment_id,
                self.phase
            );
            return Ok(());
        }

        if self.dirty {
            self.save_with_trigger(SaveTrigger::SubmitFlush).await?;
        }

        self.phase = SessionPhase::Submitting;
        self.disarm_autosave();

        let key = self
            .submit_key
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let result = self
            .persistence
            .submit_assignment(&self.assignment_id, &self.content, &key)
            .await;

        match result {
            Ok(receipt) => {
                if let Some(assignment) = self.assignment.as_mut() {
                    assignment.status = AssignmentStatus::Completed;
                }
                self.phase = SessionPhase::Locked;
                SUBMISSIONS_TOTAL.with_label_values(&["success"]).inc();
                tracing::info!(
                    "Assignment {} submitted at {}",
                    self.assignment_id,
                    receipt.completed_at
                );
                self.navigator.leave_session(LeaveReason::Submitted);
                Ok(())
            }
            Err(err) => {
                self.phase = SessionPhase::Ready;
                SUBMISSIONS_TOTAL.with_label_values(&["failure"]).inc();
                tracing::error!(
                    "Submission failed for assignment {}: {}",
                    self.assignment_id,
                    err
                );
                Err(SessionError::Submit(err))
            }
        }
    }

    /// Tears the session down: cancels any pending autosave and discards the
    /// in-memory response without persisting it. Safe to call repeatedly;
    /// every operation after the first close is a silent no-op.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.disarm_autosave();
        self.content.clear();
        if self.phase != SessionPhase::Error {
            SESSIONS_ACTIVE.dec();
        }
        tracing::info!("Session closed for assignment {}", self.assignment_id);
    }

    pub(crate) fn disarm_autosave(&mut self) {
        self.timer.clear();
        self.deadline_tx.send_replace(None);
    }

    /// Disarms the timer unless a newer edit re-armed it past `fired` in the
    /// meantime.
    pub(crate) fn disarm_autosave_if_stale(&mut self, fired: Instant) {
        if self.timer.deadline().map_or(true, |d| d <= fired) {
            self.disarm_autosave();
        }
    }

    pub(crate) fn subscribe_autosave(&self) -> watch::Receiver<Option<Instant>> {
        self.deadline_tx.subscribe()
    }

    pub fn assignment_id(&self) -> &str {
        &self.assignment_id
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn error_detail(&self) -> Option<&SessionError> {
        self.error_detail.as_ref()
    }
}

impl Drop for AssignmentSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared handle over an [`AssignmentSession`] plus its autosave worker.
///
/// The mutex serializes every operation, which is what enforces the "at most
/// one outstanding persistence call" guarantee: an autosave firing while a
/// manual save is in flight parks on the lock and runs once the save
/// settles, instead of racing it.
pub struct SessionHandle {
    inner: Arc<Mutex<AssignmentSession>>,
    autosave: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn open(
        assignment_id: impl Into<String>,
        persistence: Arc<dyn PersistenceClient>,
        navigator: Arc<dyn SessionNavigator>,
        policy: AutosavePolicy,
        autosave_retry: RetryConfig,
    ) -> Self {
        let session = AssignmentSession::open(assignment_id, persistence, navigator, policy).await;
        let deadlines = session.subscribe_autosave();
        let inner = Arc::new(Mutex::new(session));
        let autosave = tokio::spawn(autosave::run_worker(
            Arc::downgrade(&inner),
            deadlines,
            autosave_retry,
        ));

        Self { inner, autosave }
    }

    pub async fn update_content(&self, content: impl Into<String>) {
        self.inner.lock().await.update_content(content);
    }

    pub async fn save(&self) -> Result<(), SessionError> {
        self.inner.lock().await.save().await
    }

    pub async fn submit(&self) -> Result<(), SessionError> {
        self.inner.lock().await.submit().await
    }

    /// Stops the autosave worker and tears the session down. An in-flight
    /// persistence call is not interrupted; it completes against the still
    /// live session before the teardown can take the lock.
    pub async fn close(&self) {
        self.autosave.abort();
        self.inner.lock().await.close();
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase()
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.is_dirty()
    }

    pub async fn content(&self) -> String {
        self.inner.lock().await.content().to_string()
    }

    pub async fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.last_saved_at()
    }

    pub async fn assignment(&self) -> Option<Assignment> {
        self.inner.lock().await.assignment().cloned()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.autosave.abort();
    }
}
