use serde::Serialize;

/// Why the session is asking the host application to leave the editing
/// screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    LoadError,
    Submitted,
}

/// Navigation collaborator. The session only signals that the screen should
/// be left; where to redirect is the host's decision.
pub trait SessionNavigator: Send + Sync {
    fn leave_session(&self, reason: LeaveReason);
}
