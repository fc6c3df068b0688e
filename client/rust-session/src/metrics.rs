use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

lazy_static! {
    // Session lifecycle metrics
    pub static ref SESSIONS_OPENED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "assignment_sessions_opened_total",
        "Total number of assignment editing sessions opened",
        &["result"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "assignment_sessions_active",
        "Number of currently active assignment editing sessions"
    )
    .unwrap();

    // Persistence metrics
    pub static ref DRAFT_SAVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "assignment_draft_saves_total",
        "Total number of draft save attempts",
        &["trigger", "result"]
    )
    .unwrap();

    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "assignment_submissions_total",
        "Total number of submission attempts",
        &["result"]
    )
    .unwrap();

    pub static ref STALE_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "assignment_stale_writes_total",
        "Writes dropped because the session no longer accepts them",
        &["operation"]
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Just verify that all metrics are properly registered
        let _ = SESSIONS_OPENED_TOTAL.with_label_values(&["opened"]).get();
        let _ = DRAFT_SAVES_TOTAL
            .with_label_values(&["manual", "success"])
            .get();
        let _ = SUBMISSIONS_TOTAL.with_label_values(&["failure"]).get();
        let _ = STALE_WRITES_TOTAL.with_label_values(&["edit"]).get();
        let _ = SESSIONS_ACTIVE.get();
    }
}
