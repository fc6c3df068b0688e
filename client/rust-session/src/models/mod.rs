use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: String,
    pub pdf_path: String,
    pub status: AssignmentStatus,
}

/// Completion flag of an assignment. Transitions at most once, to
/// `Completed`, and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    InProgress,
    Completed,
}

/// Where an editing session currently is in its lifecycle. `Locked` is
/// terminal: the response is read-only from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    Ready,
    Saving,
    Submitting,
    Error,
    Locked,
}
