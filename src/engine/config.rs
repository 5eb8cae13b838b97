use std::time::Duration;

use crate::reconcile::ReconcileConfig;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the scheduled poll cycle
    pub poll_interval: Duration,
    /// Bound on each presence request; a timeout counts as a transient failure
    pub fetch_timeout: Duration,
    /// Bound on one persistence write sequence
    pub write_timeout: Duration,
    pub reconcile: ReconcileConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            reconcile: ReconcileConfig::default(),
        }
    }
}
