//! Presence source port.
//!
//! A presence API only reports what is happening *now*. The engine asks it for
//! one snapshot per poll cycle and, on an empty day, for the coarser recent
//! activity feed used by backfill.

pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{RecentActivity, Snapshot};

pub use http::HttpPresenceSource;

#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Current activity of `account_id`. Failures are transient; the engine
    /// retries on its next tick.
    async fn fetch_snapshot(&self, account_id: &str) -> Result<Snapshot>;

    /// Best-effort list of activities seen recently.
    async fn fetch_recent_activity(&self, account_id: &str) -> Result<Vec<RecentActivity>>;
}
