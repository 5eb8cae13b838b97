//! Presence readings.
//!
//! A `Snapshot` is one instantaneous answer to "what is happening right now";
//! it has no identity and is discarded once the state machine consumed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub activity_id: Option<String>,
    pub activity_name: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn idle(observed_at: DateTime<Utc>) -> Self {
        Self {
            activity_id: None,
            activity_name: None,
            observed_at,
        }
    }

    pub fn active(
        activity_id: impl Into<String>,
        activity_name: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: Some(activity_id.into()),
            activity_name: Some(activity_name.into()),
            observed_at,
        }
    }

    /// `(id, name)` of the observed activity, or `None` when idle.
    ///
    /// Presence APIs sometimes report only one of the two fields; the missing
    /// one falls back to the other so sessions always carry both.
    pub fn activity(&self) -> Option<(&str, &str)> {
        let id = non_empty(self.activity_id.as_deref());
        let name = non_empty(self.activity_name.as_deref());
        match (id, name) {
            (Some(id), Some(name)) => Some((id, name)),
            (Some(id), None) => Some((id, id)),
            (None, Some(name)) => Some((name, name)),
            (None, None) => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activity().is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Coarser "recently active" signal used to backfill sessions that started and
/// ended between two polls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub activity_id: String,
    pub activity_name: String,
    pub last_observed_at: DateTime<Utc>,
    pub recent_minutes: u32,
}
