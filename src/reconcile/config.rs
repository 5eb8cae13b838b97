use chrono::Duration;

/// Tunable thresholds for turning snapshots into sessions.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Closed sessions shorter than this are poll noise and are dropped
    pub min_session_minutes: u32,

    /// Upper bound for a backfilled (estimated) session
    pub backfill_cap_minutes: u32,

    /// A session opened from idle starts at the previous observation when that
    /// observation is at most this far back; otherwise it starts at the
    /// observation that detected it.
    pub max_lead_in: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_session_minutes: 1,
            backfill_cap_minutes: 60,
            max_lead_in: Duration::seconds(120),
        }
    }
}
