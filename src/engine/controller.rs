use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, Context, Result};
use tokio::{
    sync::{watch, Mutex},
    time,
};

use crate::{
    clock::Clock,
    models::{DayKey, SessionState, Snapshot},
    presence::PresenceSource,
    reconcile::{apply_backfill, close_active, needs_backfill, roll_over, step, summarize, TransitionKind},
    store::{
        day_log_key,
        records::{write_day_log, write_state},
        DayLog, PersistenceStore,
    },
};

use super::{recovery::recover, Diagnostics, EngineConfig, EngineStatus};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already running; this trigger was dropped
    Skipped,
    /// The presence fetch failed or timed out; state untouched
    FetchFailed,
    /// Snapshot observed before the last applied one; dropped
    OutOfOrder,
    Applied(TransitionKind),
}

struct Tracked {
    day: DayKey,
    state: SessionState,
    /// Days closed by a rollover whose final log has not been written yet
    finished_days: Vec<(DayKey, SessionState)>,
    /// Bumped on every mutation; orders persistence writes
    revision: u64,
}

struct EngineInner {
    account_id: String,
    config: EngineConfig,
    presence: Arc<dyn PresenceSource>,
    store: Arc<dyn PersistenceStore>,
    clock: Arc<dyn Clock>,
    tracked: Mutex<Tracked>,
    in_flight: AtomicBool,
    /// Revision of the last state that reached the store
    durable_revision: Mutex<Option<u64>>,
    status: watch::Sender<EngineStatus>,
}

/// Owns one account's state for the current day and drives it from presence
/// snapshots. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

impl ReconciliationEngine {
    /// Recovers today's state from `store` and returns a ready engine. Never
    /// fails: unusable records are logged and replaced by a fresh state.
    pub async fn open(
        account_id: impl Into<String>,
        config: EngineConfig,
        presence: Arc<dyn PresenceSource>,
        store: Arc<dyn PersistenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let account_id = account_id.into();
        let now = clock.now();
        let recovery = recover(
            store.as_ref(),
            now,
            clock.offset_at(now),
            config.reconcile.min_session_minutes,
        )
        .await;

        log_info!(
            "Engine for {} opened {} from {:?} ({} sessions, {} min, active: {})",
            account_id,
            recovery.day,
            recovery.source,
            recovery.state.completed_sessions.len(),
            recovery.state.total_minutes,
            recovery.state.active_session.is_some()
        );

        let summary = summarize(&recovery.state, now);
        let (status, _) = watch::channel(EngineStatus::loading(summary, clock.offset_at(now), now));

        Self {
            inner: Arc::new(EngineInner {
                account_id,
                config,
                presence,
                store,
                clock,
                tracked: Mutex::new(Tracked {
                    day: recovery.day,
                    state: recovery.state,
                    finished_days: Vec::new(),
                    revision: 0,
                }),
                in_flight: AtomicBool::new(false),
                durable_revision: Mutex::new(None),
                status,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Runs one fetch → reconcile → persist → publish pass. At most one cycle
    /// runs at a time; a concurrent call returns `Skipped` immediately.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        let Some(_flight) = FlightGuard::acquire(&self.inner.in_flight) else {
            log_debug!("poll cycle already in flight; dropping trigger");
            return CycleOutcome::Skipped;
        };

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let message = format!("{err:#}");
                log_warn!("presence fetch failed for {}: {message}", self.inner.account_id);
                self.publish(Some(message)).await;
                return CycleOutcome::FetchFailed;
            }
        };

        let Some(kind) = self.apply_snapshot(&snapshot).await else {
            self.publish(None).await;
            return CycleOutcome::OutOfOrder;
        };

        self.backfill_if_empty().await;

        let persist_error = match self.persist().await {
            Ok(()) => None,
            Err(err) => {
                log_error!("failed to persist state: {err:#}");
                Some(format!("{err:#}"))
            }
        };
        self.publish(persist_error).await;

        CycleOutcome::Applied(kind)
    }

    /// Persists the current state if it has changed since the last write. A
    /// failure is also published as `last_error`.
    pub async fn flush(&self) -> Result<()> {
        log_info!("flushing state for {}", self.inner.account_id);
        let result = self.persist().await;
        if let Err(err) = &result {
            self.publish(Some(format!("{err:#}"))).await;
        }
        result
    }

    /// Closes any running session and writes the final state.
    pub async fn shutdown(&self) -> Result<()> {
        let now = self.inner.clock.now();
        {
            let mut tracked = self.inner.tracked.lock().await;
            let offset = self.inner.clock.offset_at(tracked.state.last_checked_at);
            let day_end = tracked.day.end_utc(offset);
            let close_at = now.min(day_end).max(tracked.state.last_checked_at);

            let transition = close_active(&tracked.state, close_at, &self.inner.config.reconcile);
            if transition.kind == TransitionKind::Closed {
                let mut next = transition.state;
                if close_at >= day_end {
                    // keep the record dated inside its own day
                    next.last_checked_at = tracked.state.last_checked_at;
                }
                if let Some(session) = &transition.closed {
                    log_info!(
                        "closed {} at shutdown after {} min",
                        session.activity_name,
                        session.duration_minutes
                    );
                }
                tracked.state = next;
                tracked.revision += 1;
            }
        }

        let result = self.persist().await;
        self.publish(result.as_ref().err().map(|err| format!("{err:#}")))
            .await;
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.status.borrow().clone()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let tracked = self.inner.tracked.lock().await;
        Diagnostics {
            active_session: tracked.state.active_session.clone(),
            completed_sessions: tracked.state.completed_sessions.clone(),
            total_minutes: tracked.state.total_minutes,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.tracked.lock().await.state.clone()
    }

    pub async fn current_day(&self) -> DayKey {
        self.inner.tracked.lock().await.day
    }

    /// Reads a stored day log. Past days are read-only history.
    pub async fn day_log(&self, day: DayKey) -> Result<Option<DayLog>> {
        match self.inner.store.read(&day_log_key(day)).await? {
            Some(value) => DayLog::decode(value).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let timeout = self.inner.config.fetch_timeout;
        time::timeout(
            timeout,
            self.inner.presence.fetch_snapshot(&self.inner.account_id),
        )
        .await
        .map_err(|_| anyhow!("presence fetch timed out after {}s", timeout.as_secs()))?
    }

    /// Applies one snapshot under the state lock. Returns `None` when the
    /// snapshot is older than the last applied one.
    async fn apply_snapshot(&self, snapshot: &Snapshot) -> Option<TransitionKind> {
        let now = snapshot.observed_at;
        let offset = self.inner.clock.offset_at(now);
        let config = &self.inner.config.reconcile;

        let kind = {
            let mut tracked = self.inner.tracked.lock().await;
            if now < tracked.state.last_checked_at {
                log_warn!(
                    "dropping snapshot observed at {} (last checked {})",
                    now,
                    tracked.state.last_checked_at
                );
                return None;
            }

            let today = DayKey::from_timestamp(now, offset);
            if today != tracked.day {
                let previous_day = tracked.day;
                let rolled = roll_over(&tracked.state, previous_day.end_utc(offset), now, config);
                log_info!(
                    "day rolled over {} -> {} ({} min recorded)",
                    previous_day,
                    today,
                    rolled.previous.total_minutes
                );
                tracked.finished_days.push((previous_day, rolled.previous));
                tracked.day = today;
                tracked.state = rolled.next;
                tracked.revision += 1;
            }

            let transition = step(&tracked.state, snapshot, now, config);
            match transition.kind {
                TransitionKind::Opened | TransitionKind::Switched => {
                    if let Some(active) = &transition.state.active_session {
                        log_info!(
                            "session opened: {} at {}",
                            active.activity_name,
                            active.start_time
                        );
                    }
                }
                TransitionKind::Closed => {}
                TransitionKind::Idle | TransitionKind::Continued => {
                    log_debug!("poll at {now}: {:?}", transition.kind)
                }
            }
            if let Some(closed) = &transition.closed {
                log_info!(
                    "session closed: {} ({} min)",
                    closed.activity_name,
                    closed.duration_minutes
                );
            }
            if let Some(discarded) = &transition.discarded {
                log_info!("discarding sub-minute session for {}", discarded.activity_name);
            }

            tracked.state = transition.state;
            tracked.revision += 1;
            transition.kind
        };

        Some(kind)
    }

    async fn backfill_if_empty(&self) {
        if !needs_backfill(&self.inner.tracked.lock().await.state) {
            return;
        }

        let recent = match time::timeout(
            self.inner.config.fetch_timeout,
            self.inner.presence.fetch_recent_activity(&self.inner.account_id),
        )
        .await
        {
            Ok(Ok(recent)) => recent,
            Ok(Err(err)) => {
                log_warn!("recent activity fetch failed, skipping backfill: {err:#}");
                return;
            }
            Err(_) => {
                log_warn!("recent activity fetch timed out, skipping backfill");
                return;
            }
        };

        // Re-check under the lock: the state may have gained a session while
        // the feed was being fetched.
        let mut tracked = self.inner.tracked.lock().await;
        let now = tracked.state.last_checked_at;
        let offset = self.inner.clock.offset_at(now);
        if let Some(next) = apply_backfill(&tracked.state, &recent, now, offset, &self.inner.config.reconcile) {
            if let Some(estimate) = next.completed_sessions.last() {
                log_info!(
                    "backfilled {} min of {} ending {:?}",
                    estimate.duration_minutes,
                    estimate.activity_name,
                    estimate.end_time
                );
            }
            tracked.state = next;
            tracked.revision += 1;
        }
    }

    /// Writes the latest state. Writes are serialized and never go backwards:
    /// a revision at or below the last durable one is skipped.
    ///
    /// Final logs of days left behind by a rollover go first and stay queued
    /// in memory until they have been written.
    async fn persist(&self) -> Result<()> {
        let mut durable = self.inner.durable_revision.lock().await;
        let (day, state, finished_days, revision) = {
            let tracked = self.inner.tracked.lock().await;
            (
                tracked.day,
                tracked.state.clone(),
                tracked.finished_days.clone(),
                tracked.revision,
            )
        };

        if finished_days.is_empty() && durable.is_some_and(|written| written >= revision) {
            return Ok(());
        }

        for (finished, previous) in &finished_days {
            let write = write_day_log(self.inner.store.as_ref(), *finished, previous);
            self.write_with_timeout(write)
                .await
                .with_context(|| format!("final day log for {finished} not saved"))?;
            log_info!("final day log for {finished} saved ({} min)", previous.total_minutes);
            self.inner
                .tracked
                .lock()
                .await
                .finished_days
                .retain(|(pending, _)| pending != finished);
        }

        self.write_with_timeout(write_state(self.inner.store.as_ref(), day, &state))
            .await?;
        *durable = Some(revision);
        Ok(())
    }

    async fn write_with_timeout<F>(&self, write: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let timeout = self.inner.config.write_timeout;
        time::timeout(timeout, write)
            .await
            .map_err(|_| anyhow!("state write timed out after {}s", timeout.as_secs()))?
    }

    async fn publish(&self, last_error: Option<String>) {
        let now = self.inner.clock.now();
        let summary = {
            let tracked = self.inner.tracked.lock().await;
            summarize(&tracked.state, now.max(tracked.state.last_checked_at))
        };
        let status = EngineStatus::from_summary(summary, self.inner.clock.offset_at(now), last_error, now);
        self.inner.status.send_replace(status);
    }
}

/// Single-flight token. Released on drop, including when the owning cycle is
/// aborted mid-await.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
