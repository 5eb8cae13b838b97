//! Display-ready totals. Pure functions of `SessionState`; nothing here writes
//! or performs I/O.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::models::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub current_activity_name: Option<String>,
    /// Stored total plus the running session's elapsed minutes
    pub total_duration_minutes: u32,
    pub first_activity_time: Option<DateTime<Utc>>,
}

pub fn summarize(state: &SessionState, now: DateTime<Utc>) -> DaySummary {
    let running = state
        .active_session
        .as_ref()
        .map(|session| session.elapsed_minutes(now))
        .unwrap_or(0);

    DaySummary {
        current_activity_name: state
            .active_session
            .as_ref()
            .map(|session| session.activity_name.clone()),
        total_duration_minutes: state.total_minutes.saturating_add(running),
        first_activity_time: state.first_activity_time,
    }
}

pub fn format_duration(minutes: u32) -> String {
    if minutes == 0 {
        return "No activity today".to_string();
    }

    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{hours}h {mins:02}m")
    } else {
        format!("{mins}m")
    }
}

pub fn format_time_of_day(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%H:%M").to_string()
}
