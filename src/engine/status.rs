use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::{
    models::Session,
    reconcile::{format_duration, format_time_of_day, DaySummary},
};

/// What a UI layer renders. Republished after every poll cycle.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub current_activity_name: Option<String>,
    pub first_activity_time_of_day: Option<String>,
    pub total_duration_text: String,
    pub total_duration_minutes: u32,
    pub is_loading: bool,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EngineStatus {
    /// Recovered totals, flagged as loading until the first poll cycle ends.
    pub fn loading(summary: DaySummary, offset: FixedOffset, now: DateTime<Utc>) -> Self {
        Self {
            is_loading: true,
            ..Self::from_summary(summary, offset, None, now)
        }
    }

    pub fn from_summary(
        summary: DaySummary,
        offset: FixedOffset,
        last_error: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            current_activity_name: summary.current_activity_name,
            first_activity_time_of_day: summary
                .first_activity_time
                .map(|at| format_time_of_day(at, offset)),
            total_duration_text: format_duration(summary.total_duration_minutes),
            total_duration_minutes: summary.total_duration_minutes,
            is_loading: false,
            last_error,
            updated_at: Some(now),
        }
    }
}

/// Raw view of the engine state for debugging screens and logs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub active_session: Option<Session>,
    pub completed_sessions: Vec<Session>,
    pub total_minutes: u32,
}
