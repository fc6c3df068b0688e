pub mod config;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use models::{Assignment, AssignmentStatus, SessionPhase};
pub use services::assignment_session::{AssignmentSession, SessionError, SessionHandle};
pub use services::autosave::AutosavePolicy;
pub use services::navigation::{LeaveReason, SessionNavigator};
pub use services::persistence::{
    HttpPersistenceClient, LoadedAssignment, PersistenceClient, PersistenceError, SaveReceipt,
    SubmitReceipt,
};
pub use utils::retry::RetryConfig;
