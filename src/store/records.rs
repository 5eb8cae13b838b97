//! Persisted record shapes and their mapping to `SessionState`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DayKey, Session, SessionState};

use super::{day_log_key, PersistenceStore, ACTIVE_STATE_KEY};

/// Completed history of one day. Written every cycle; read-only once the day
/// is over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayLog {
    pub date: DayKey,
    pub sessions: Vec<Session>,
    pub total_minutes: u32,
    pub first_activity_time: Option<DateTime<Utc>>,
}

impl DayLog {
    pub fn from_state(date: DayKey, state: &SessionState) -> Self {
        Self {
            date,
            sessions: state.completed_sessions.clone(),
            total_minutes: state.total_minutes,
            first_activity_time: state.first_activity_time,
        }
    }

    pub fn decode(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("day log does not match the expected shape")
    }

    /// Rebuilds a state with no running session, checked against the usual
    /// invariants.
    pub fn into_state(self, last_checked_at: DateTime<Utc>, min_session_minutes: u32) -> Result<SessionState> {
        let state = SessionState {
            active_session: None,
            completed_sessions: self.sessions,
            total_minutes: self.total_minutes,
            first_activity_time: self.first_activity_time,
            last_checked_at,
        };
        state
            .validate(min_session_minutes)
            .with_context(|| format!("day log {} violates session invariants", self.date))?;
        Ok(state)
    }
}

/// Full engine state, including the running session, for crash recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveState {
    pub active_session: Option<Session>,
    pub sessions: Vec<Session>,
    pub total_minutes: u32,
    pub first_activity_time: Option<DateTime<Utc>>,
    pub last_checked_at: DateTime<Utc>,
}

impl From<&SessionState> for ActiveState {
    fn from(state: &SessionState) -> Self {
        Self {
            active_session: state.active_session.clone(),
            sessions: state.completed_sessions.clone(),
            total_minutes: state.total_minutes,
            first_activity_time: state.first_activity_time,
            last_checked_at: state.last_checked_at,
        }
    }
}

impl ActiveState {
    pub fn decode(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("active state does not match the expected shape")
    }

    pub fn into_state(self, min_session_minutes: u32) -> Result<SessionState> {
        let state = SessionState {
            active_session: self.active_session,
            completed_sessions: self.sessions,
            total_minutes: self.total_minutes,
            first_activity_time: self.first_activity_time,
            last_checked_at: self.last_checked_at,
        };
        state
            .validate(min_session_minutes)
            .context("active state violates session invariants")?;
        Ok(state)
    }
}

pub async fn write_day_log(
    store: &dyn PersistenceStore,
    day: DayKey,
    state: &SessionState,
) -> Result<()> {
    let value = serde_json::to_value(DayLog::from_state(day, state))
        .context("failed to encode day log")?;
    store
        .write(&day_log_key(day), value)
        .await
        .with_context(|| format!("failed to write day log {day}"))
}

/// Writes the day log first and the active state last, so a crash between the
/// two leaves a recoverable active state from the previous cycle.
pub async fn write_state(
    store: &dyn PersistenceStore,
    day: DayKey,
    state: &SessionState,
) -> Result<()> {
    write_day_log(store, day, state).await?;

    let value = serde_json::to_value(ActiveState::from(state))
        .context("failed to encode active state")?;
    store
        .write(ACTIVE_STATE_KEY, value)
        .await
        .context("failed to write active state")
}
