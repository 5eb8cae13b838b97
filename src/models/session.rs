//! Session and per-day state models.
//!
//! A `Session` is one contiguous run of the same activity reconstructed from
//! several snapshots. `SessionState` is the root entity of the engine: one
//! instance per `DayKey`, mutated only by the state machine.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DayKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub activity_id: String,
    pub activity_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub is_estimated: bool,
}

impl Session {
    pub fn open(
        activity_id: impl Into<String>,
        activity_name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_name: activity_name.into(),
            start_time,
            end_time: None,
            duration_minutes: 0,
            is_estimated: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Whole minutes between `start_time` and `at`, floored, never negative.
    pub fn elapsed_minutes(&self, at: DateTime<Utc>) -> u32 {
        whole_minutes(self.start_time, at)
    }

    /// Returns the closed copy of this session ending at `at`.
    pub fn closed_at(&self, at: DateTime<Utc>) -> Session {
        Session {
            end_time: Some(at),
            duration_minutes: self.elapsed_minutes(at),
            ..self.clone()
        }
    }
}

pub(crate) fn whole_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let minutes = (to - from).num_minutes().max(0);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub active_session: Option<Session>,
    pub completed_sessions: Vec<Session>,
    pub total_minutes: u32,
    pub first_activity_time: Option<DateTime<Utc>>,
    pub last_checked_at: DateTime<Utc>,
}

impl SessionState {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            active_session: None,
            completed_sessions: Vec::new(),
            total_minutes: 0,
            first_activity_time: None,
            last_checked_at: now,
        }
    }

    pub fn day_key(&self, offset: chrono::FixedOffset) -> DayKey {
        DayKey::from_timestamp(self.last_checked_at, offset)
    }

    /// Nothing has been observed today: no history, no running session and no
    /// first-activity marker.
    pub fn is_empty(&self) -> bool {
        self.completed_sessions.is_empty()
            && self.active_session.is_none()
            && self.first_activity_time.is_none()
    }

    pub(crate) fn push_completed(&mut self, session: Session) {
        self.total_minutes = self.total_minutes.saturating_add(session.duration_minutes);
        self.completed_sessions.push(session);
    }

    pub(crate) fn mark_first_activity(&mut self, at: DateTime<Utc>) {
        if self.first_activity_time.is_none() {
            self.first_activity_time = Some(at);
        }
    }

    /// Checks the invariants a recovered record must satisfy before the engine
    /// adopts it.
    pub fn validate(&self, min_session_minutes: u32) -> Result<()> {
        if let Some(active) = &self.active_session {
            if !active.is_open() {
                bail!("active session for {} already has an end time", active.activity_id);
            }
        }

        let mut sum: u32 = 0;
        for session in &self.completed_sessions {
            if session.is_open() {
                bail!("completed session for {} has no end time", session.activity_id);
            }
            if session.duration_minutes < min_session_minutes {
                bail!(
                    "completed session for {} lasts {} minutes",
                    session.activity_id,
                    session.duration_minutes
                );
            }
            sum = sum.saturating_add(session.duration_minutes);
        }

        if sum != self.total_minutes {
            bail!(
                "total minutes {} do not match session sum {}",
                self.total_minutes,
                sum
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn closed_session_floors_to_whole_minutes() {
        let session = Session::open("a", "Alpha", at(0)).closed_at(at(90));
        assert_eq!(session.duration_minutes, 1);
        assert_eq!(session.end_time, Some(at(90)));
    }

    #[test]
    fn elapsed_never_goes_negative() {
        let session = Session::open("a", "Alpha", at(120));
        assert_eq!(session.elapsed_minutes(at(0)), 0);
    }

    #[test]
    fn validate_rejects_mismatched_totals() {
        let mut state = SessionState::fresh(at(0));
        state.push_completed(Session::open("a", "Alpha", at(0)).closed_at(at(300)));
        assert!(state.validate(1).is_ok());

        state.total_minutes += 3;
        assert!(state.validate(1).is_err());
    }

    #[test]
    fn validate_rejects_sub_minute_history() {
        let mut state = SessionState::fresh(at(0));
        state.push_completed(Session::open("a", "Alpha", at(0)).closed_at(at(30)));
        assert!(state.validate(1).is_err());
    }

    #[test]
    fn first_activity_is_sticky() {
        let mut state = SessionState::fresh(at(0));
        state.mark_first_activity(at(60));
        state.mark_first_activity(at(600));
        assert_eq!(state.first_activity_time, Some(at(60)));
    }
}
