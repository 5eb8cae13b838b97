use chrono::{DateTime, FixedOffset, Utc};

use crate::models::{session::whole_minutes, DayKey, RecentActivity, Session, SessionState};

use super::config::ReconcileConfig;

/// Backfill only ever runs against a day that has seen nothing yet. Once any
/// session (real or estimated) exists this stays false for the rest of the
/// day, which is what keeps backfill from running twice.
pub fn needs_backfill(state: &SessionState) -> bool {
    state.is_empty()
}

/// Synthesizes one estimated session from the recent-activity feed.
///
/// Picks the most recently observed record that falls inside today's window
/// (`lastObservedAt` in `day` and not after `now`), caps it at
/// `backfill_cap_minutes`, and clamps its start to local midnight. Returns
/// `None` when the state is not empty or nothing qualifies.
pub fn apply_backfill(
    state: &SessionState,
    recent: &[RecentActivity],
    now: DateTime<Utc>,
    offset: FixedOffset,
    config: &ReconcileConfig,
) -> Option<SessionState> {
    if !needs_backfill(state) {
        return None;
    }

    let day = DayKey::from_timestamp(now, offset);
    let candidate = recent
        .iter()
        .filter(|record| record.recent_minutes > 0)
        .filter(|record| record.last_observed_at <= now)
        .filter(|record| day.contains(record.last_observed_at, offset))
        .max_by_key(|record| record.last_observed_at)?;

    let minutes = candidate.recent_minutes.min(config.backfill_cap_minutes);
    let end = candidate.last_observed_at;
    let start = (end - chrono::Duration::minutes(i64::from(minutes))).max(day.start_utc(offset));

    let duration_minutes = whole_minutes(start, end);
    if duration_minutes < config.min_session_minutes {
        return None;
    }

    let mut next = state.clone();
    next.push_completed(Session {
        activity_id: candidate.activity_id.clone(),
        activity_name: candidate.activity_name.clone(),
        start_time: start,
        end_time: Some(end),
        duration_minutes,
        is_estimated: true,
    });
    next.mark_first_activity(start);

    Some(next)
}
