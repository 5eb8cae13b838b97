//! Snapshot-driven session state machine.
//!
//! The machine has two phases, `Idle` and `Active(activity)`. Every function
//! here is pure: it takes the prior state by reference and returns the next
//! one, so the engine can apply a transition atomically under its lock and
//! persist afterwards.

use chrono::{DateTime, Utc};

use crate::models::{Session, SessionState, Snapshot};

use super::config::ReconcileConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase<'a> {
    Idle,
    Active(&'a str),
}

pub fn phase(state: &SessionState) -> Phase<'_> {
    match &state.active_session {
        Some(session) => Phase::Active(session.activity_id.as_str()),
        None => Phase::Idle,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Idle and still idle
    Idle,
    Opened,
    Continued,
    Switched,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub kind: TransitionKind,
    /// Session appended to history by this transition
    pub closed: Option<Session>,
    /// Session that ended below the minimum duration and was dropped
    pub discarded: Option<Session>,
}

pub fn step(
    state: &SessionState,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
    config: &ReconcileConfig,
) -> Transition {
    let mut next = state.clone();
    let mut closed = None;
    let mut discarded = None;

    let kind = match (&state.active_session, snapshot.activity()) {
        (None, None) => TransitionKind::Idle,
        (None, Some((id, name))) => {
            let start = lead_in_start(state.last_checked_at, now, config);
            next.active_session = Some(Session::open(id, name, start));
            next.mark_first_activity(start);
            TransitionKind::Opened
        }
        (Some(active), Some((id, _))) if active.activity_id == id => TransitionKind::Continued,
        (Some(_), Some((id, name))) => {
            (closed, discarded) = finish_active(&mut next, now, config);
            next.active_session = Some(Session::open(id, name, now));
            TransitionKind::Switched
        }
        (Some(_), None) => {
            (closed, discarded) = finish_active(&mut next, now, config);
            TransitionKind::Closed
        }
    };

    next.last_checked_at = next.last_checked_at.max(now);

    Transition {
        state: next,
        kind,
        closed,
        discarded,
    }
}

/// Closes the running session at `at` as if an idle snapshot had been
/// observed. Used on shutdown.
pub fn close_active(state: &SessionState, at: DateTime<Utc>, config: &ReconcileConfig) -> Transition {
    let mut next = state.clone();
    let (closed, discarded) = finish_active(&mut next, at, config);
    let kind = if closed.is_some() || discarded.is_some() {
        TransitionKind::Closed
    } else {
        TransitionKind::Idle
    };
    next.last_checked_at = next.last_checked_at.max(at);

    Transition {
        state: next,
        kind,
        closed,
        discarded,
    }
}

#[derive(Debug, Clone)]
pub struct RollOver {
    /// The finished day, with any running session closed at midnight
    pub previous: SessionState,
    /// Fresh state for the new day
    pub next: SessionState,
}

/// Splits the state at a day boundary. `day_end` is the local midnight that
/// separates the state's day from the day of `now`.
pub fn roll_over(
    state: &SessionState,
    day_end: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &ReconcileConfig,
) -> RollOver {
    let was_active = state.active_session.is_some();

    let mut previous = close_active(state, day_end, config).state;
    previous.last_checked_at = state.last_checked_at;

    // A session still running at midnight may continue into the new day; let
    // the lead-in rule reach back to midnight for it.
    let anchor = if was_active { day_end.min(now) } else { now };

    RollOver {
        previous,
        next: SessionState::fresh(anchor),
    }
}

fn finish_active(
    state: &mut SessionState,
    at: DateTime<Utc>,
    config: &ReconcileConfig,
) -> (Option<Session>, Option<Session>) {
    let Some(active) = state.active_session.take() else {
        return (None, None);
    };

    let finished = active.closed_at(at);
    if finished.duration_minutes < config.min_session_minutes {
        (None, Some(finished))
    } else {
        state.push_completed(finished.clone());
        (Some(finished), None)
    }
}

fn lead_in_start(
    last_checked_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &ReconcileConfig,
) -> DateTime<Utc> {
    let gap = now - last_checked_at;
    if gap >= chrono::Duration::zero() && gap <= config.max_lead_in {
        last_checked_at
    } else {
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn idle(secs: i64) -> Snapshot {
        Snapshot::idle(at(secs))
    }

    fn playing(id: &str, secs: i64) -> Snapshot {
        Snapshot::active(id, format!("Game {id}"), at(secs))
    }

    fn run(start: i64, snapshots: &[Snapshot]) -> SessionState {
        let config = ReconcileConfig::default();
        snapshots
            .iter()
            .fold(SessionState::fresh(at(start)), |state, snapshot| {
                step(&state, snapshot, snapshot.observed_at, &config).state
            })
    }

    #[test]
    fn idle_to_idle_only_advances_last_checked() {
        let state = SessionState::fresh(at(0));
        let transition = step(&state, &idle(60), at(60), &ReconcileConfig::default());

        assert_eq!(transition.kind, TransitionKind::Idle);
        assert_eq!(transition.state.last_checked_at, at(60));
        assert!(transition.state.is_empty());
    }

    #[test]
    fn opening_sets_first_activity_once() {
        let state = run(0, &[playing("a", 0), idle(300), playing("b", 900)]);

        assert_eq!(state.first_activity_time, Some(at(0)));
        assert_eq!(phase(&state), Phase::Active("b"));
    }

    #[test]
    fn idle_active_run_becomes_one_four_minute_session() {
        let state = run(
            0,
            &[idle(0), playing("a", 60), playing("a", 120), playing("a", 180), idle(240)],
        );

        assert_eq!(state.completed_sessions.len(), 1);
        assert_eq!(state.completed_sessions[0].activity_id, "a");
        assert_eq!(state.completed_sessions[0].duration_minutes, 4);
        assert_eq!(state.total_minutes, 4);
        assert!(state.active_session.is_none());
    }

    #[test]
    fn sub_minute_session_is_discarded() {
        let config = ReconcileConfig::default();
        let opened = step(&SessionState::fresh(at(0)), &playing("a", 0), at(0), &config);
        let closed = step(&opened.state, &idle(30), at(30), &config);

        assert_eq!(closed.kind, TransitionKind::Closed);
        assert!(closed.closed.is_none());
        assert!(closed.discarded.is_some());
        assert!(closed.state.completed_sessions.is_empty());
        assert_eq!(closed.state.total_minutes, 0);
    }

    #[test]
    fn switching_closes_previous_and_opens_next_at_now() {
        let config = ReconcileConfig::default();
        let opened = step(&SessionState::fresh(at(0)), &playing("a", 0), at(0), &config);
        let switched = step(&opened.state, &playing("b", 90), at(90), &config);

        assert_eq!(switched.kind, TransitionKind::Switched);
        let closed = switched.closed.expect("a kept");
        assert_eq!(closed.activity_id, "a");
        assert_eq!(closed.duration_minutes, 1);
        assert_eq!(closed.end_time, Some(at(90)));

        let active = switched.state.active_session.as_ref().expect("b active");
        assert_eq!(active.activity_id, "b");
        assert_eq!(active.start_time, at(90));
        assert_eq!(switched.state.total_minutes, 1);
    }

    #[test]
    fn quick_switch_drops_the_short_session() {
        let state = run(0, &[playing("a", 0), playing("b", 40)]);

        assert!(state.completed_sessions.is_empty());
        assert_eq!(phase(&state), Phase::Active("b"));
    }

    #[test]
    fn identical_snapshots_merge_into_one_session() {
        let mut snapshots: Vec<Snapshot> = (0..30).map(|i| playing("a", i * 60)).collect();
        snapshots.push(idle(30 * 60));
        let state = run(0, &snapshots);

        assert_eq!(state.completed_sessions.len(), 1);
        assert_eq!(state.completed_sessions[0].duration_minutes, 30);
    }

    #[test]
    fn one_idle_poll_splits_the_run() {
        let state = run(
            0,
            &[playing("a", 0), playing("a", 120), idle(240), playing("a", 300), idle(480)],
        );

        assert_eq!(state.completed_sessions.len(), 2);
        // The second run reaches back to the idle read at 240s.
        assert_eq!(state.completed_sessions[1].start_time, at(240));
        assert_eq!(state.total_minutes, 4 + 4);
    }

    #[test]
    fn long_gap_before_detection_is_not_attributed() {
        let config = ReconcileConfig::default();
        let state = SessionState::fresh(at(0));
        let opened = step(&state, &playing("a", 3600), at(3600), &config);

        let active = opened.state.active_session.expect("active");
        assert_eq!(active.start_time, at(3600));
    }

    #[test]
    fn close_active_without_session_is_idle() {
        let state = SessionState::fresh(at(0));
        let transition = close_active(&state, at(120), &ReconcileConfig::default());
        assert_eq!(transition.kind, TransitionKind::Idle);
        assert!(transition.state.completed_sessions.is_empty());
    }

    #[test]
    fn roll_over_closes_at_midnight_and_starts_fresh() {
        let config = ReconcileConfig::default();
        let evening = Utc.with_ymd_and_hms(2026, 3, 14, 23, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        let morning = midnight + chrono::Duration::seconds(60);

        let state = step(
            &SessionState::fresh(evening),
            &Snapshot::active("a", "Alpha", evening),
            evening,
            &config,
        )
        .state;

        let rolled = roll_over(&state, midnight, morning, &config);
        assert_eq!(rolled.previous.completed_sessions.len(), 1);
        assert_eq!(rolled.previous.completed_sessions[0].end_time, Some(midnight));
        assert_eq!(rolled.previous.total_minutes, 60);
        assert_eq!(rolled.previous.last_checked_at, evening);
        assert!(rolled.next.is_empty());
        assert_eq!(rolled.next.last_checked_at, midnight);

        let continued = step(
            &rolled.next,
            &Snapshot::active("a", "Alpha", morning),
            morning,
            &config,
        );
        assert_eq!(continued.state.active_session.unwrap().start_time, midnight);
    }
}
