use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, Instant};

use crate::services::assignment_session::{AssignmentSession, SaveTrigger};
use crate::utils::retry::{retry_with_backoff, RetryConfig};

/// Debounce policy for background draft saves.
#[derive(Debug, Clone)]
pub struct AutosavePolicy {
    /// Quiet period after the last edit before a save fires.
    pub debounce: Duration,
    /// Upper bound on how long a continuous edit stream may go unsaved.
    pub max_wait: Duration,
    /// Content at or above this size collapses the pending deadline so
    /// oversized drafts do not sit unpersisted in memory.
    pub force_save_bytes: usize,
}

impl Default for AutosavePolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            max_wait: Duration::from_secs(10),
            force_save_bytes: 256 * 1024,
        }
    }
}

/// Deadline bookkeeping: armed by the first unsaved edit, nudged forward by
/// later edits, capped at `first_edit + max_wait`.
#[derive(Debug, Default)]
pub struct AutosaveTimer {
    first_edit: Option<Instant>,
    deadline: Option<Instant>,
}

impl AutosaveTimer {
    pub fn record_edit(&mut self, policy: &AutosavePolicy, now: Instant) {
        let first = *self.first_edit.get_or_insert(now);
        self.deadline = Some((now + policy.debounce).min(first + policy.max_wait));
    }

    /// Collapses the pending deadline so the next worker pass saves
    /// immediately.
    pub fn force(&mut self, now: Instant) {
        self.first_edit.get_or_insert(now);
        self.deadline = Some(now);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.first_edit = None;
        self.deadline = None;
    }
}

/// Background autosave worker. Sleeps until the armed deadline, then saves
/// through the same path as a manual save. Acquiring the session lock is
/// what defers the save while another persistence call is still in flight;
/// the deferred save runs as soon as that call settles.
///
/// A failed save is retried with bounded backoff; once the attempts are
/// exhausted the timer is disarmed until the next edit re-arms it.
pub(crate) async fn run_worker(
    session: Weak<Mutex<AssignmentSession>>,
    mut deadlines: watch::Receiver<Option<Instant>>,
    retry: RetryConfig,
) {
    loop {
        let armed = *deadlines.borrow_and_update();
        let Some(deadline) = armed else {
            if deadlines.changed().await.is_err() {
                return;
            }
            continue;
        };

        tokio::select! {
            changed = deadlines.changed() => {
                // Re-armed, disarmed, or the session is gone.
                if changed.is_err() {
                    return;
                }
                continue;
            }
            _ = time::sleep_until(deadline) => {}
        }

        let Some(strong) = session.upgrade() else {
            return;
        };

        let result = retry_with_backoff(retry.clone(), || async {
            strong.lock().await.save_with_trigger(SaveTrigger::Autosave).await
        })
        .await;

        if let Err(err) = result {
            tracing::warn!("Autosave gave up until the next edit: {}", err);
            strong.lock().await.disarm_autosave_if_stale(deadline);
        }
    }
}
