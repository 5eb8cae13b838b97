//! Startup recovery of the current day's state.

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use log::{info, warn};

use crate::{
    models::{DayKey, SessionState},
    store::{day_log_key, ActiveState, DayLog, PersistenceStore, ACTIVE_STATE_KEY},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySource {
    ActiveState,
    DayLog,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct Recovery {
    pub day: DayKey,
    pub state: SessionState,
    pub source: RecoverySource,
}

/// Rebuilds today's state from the store.
///
/// Prefers the active state (it carries the running session), falls back to
/// today's day log, and otherwise starts fresh. Unreadable or inconsistent
/// records count as absent; an active state from another day is dropped
/// whole.
pub async fn recover(
    store: &dyn PersistenceStore,
    now: DateTime<Utc>,
    offset: FixedOffset,
    min_session_minutes: u32,
) -> Recovery {
    let today = DayKey::from_timestamp(now, offset);

    match load_active_state(store, min_session_minutes).await {
        Ok(Some(mut state)) if today.contains(state.last_checked_at, offset) => {
            state.last_checked_at = state.last_checked_at.min(now);
            return Recovery {
                day: today,
                state,
                source: RecoverySource::ActiveState,
            };
        }
        Ok(Some(state)) => {
            info!(
                "Discarding active state from {}; starting {} fresh",
                state.day_key(offset),
                today
            );
            return Recovery {
                day: today,
                state: SessionState::fresh(now),
                source: RecoverySource::Fresh,
            };
        }
        Ok(None) => {}
        Err(err) => warn!("Ignoring unusable active state: {err:#}"),
    }

    match load_day_log(store, today, now, min_session_minutes).await {
        Ok(Some(state)) => {
            return Recovery {
                day: today,
                state,
                source: RecoverySource::DayLog,
            }
        }
        Ok(None) => {}
        Err(err) => warn!("Ignoring unusable day log for {today}: {err:#}"),
    }

    Recovery {
        day: today,
        state: SessionState::fresh(now),
        source: RecoverySource::Fresh,
    }
}

async fn load_active_state(
    store: &dyn PersistenceStore,
    min_session_minutes: u32,
) -> Result<Option<SessionState>> {
    let Some(value) = store.read(ACTIVE_STATE_KEY).await? else {
        return Ok(None);
    };
    ActiveState::decode(value)?
        .into_state(min_session_minutes)
        .map(Some)
}

async fn load_day_log(
    store: &dyn PersistenceStore,
    day: DayKey,
    now: DateTime<Utc>,
    min_session_minutes: u32,
) -> Result<Option<SessionState>> {
    let Some(value) = store.read(&day_log_key(day)).await? else {
        return Ok(None);
    };
    let log = DayLog::decode(value)?;
    if log.date != day {
        anyhow::bail!("day log stored under {day} is dated {}", log.date);
    }
    log.into_state(now, min_session_minutes).map(Some)
}
