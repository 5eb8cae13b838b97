#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use playtally_lib::{
    clock::{Clock, ManualClock},
    engine::{EngineConfig, ReconciliationEngine},
    models::{RecentActivity, Snapshot},
    presence::PresenceSource,
    store::{MemoryStore, PersistenceStore},
};

pub const ACCOUNT: &str = "acct-1";

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
}

#[derive(Debug, Clone)]
pub enum Reading {
    Idle,
    Playing(&'static str),
    Fails(&'static str),
}

/// Presence double that answers from a script, stamping each snapshot with the
/// manual clock. An exhausted script reads as idle.
pub struct ScriptedPresence {
    clock: Arc<ManualClock>,
    script: Mutex<VecDeque<Reading>>,
    recent: Mutex<Vec<RecentActivity>>,
    snapshot_calls: AtomicUsize,
    recent_calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedPresence {
    pub fn new(clock: Arc<ManualClock>, script: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            clock,
            script: Mutex::new(script.into_iter().collect()),
            recent: Mutex::new(Vec::new()),
            snapshot_calls: AtomicUsize::new(0),
            recent_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every snapshot fetch waits for one `notify_one` on the returned handle.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn with_recent(self, recent: Vec<RecentActivity>) -> Self {
        *self.recent.lock().unwrap() = recent;
        self
    }

    pub fn push(&self, reading: Reading) {
        self.script.lock().unwrap().push_back(reading);
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceSource for ScriptedPresence {
    async fn fetch_snapshot(&self, _account_id: &str) -> Result<Snapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let reading = self.script.lock().unwrap().pop_front().unwrap_or(Reading::Idle);
        let now = self.clock.now();
        match reading {
            Reading::Idle => Ok(Snapshot::idle(now)),
            Reading::Playing(id) => Ok(Snapshot::active(id, format!("Game {id}"), now)),
            Reading::Fails(message) => Err(anyhow!(message)),
        }
    }

    async fn fetch_recent_activity(&self, _account_id: &str) -> Result<Vec<RecentActivity>> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.recent.lock().unwrap().clone())
    }
}

/// Memory store whose writes can be switched to fail, or parked until the
/// writer gives up.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: AtomicBool,
    stall_next: AtomicBool,
    stall: Notify,
    writes_started: AtomicUsize,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The next write never completes on its own.
    pub fn stall_next_write(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }

    pub fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        self.writes_started.fetch_add(1, Ordering::SeqCst);
        if self.stall_next.swap(false, Ordering::SeqCst) {
            self.stall.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.write(key, value).await
    }
}

pub fn quiet_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_secs(3600),
        ..EngineConfig::default()
    }
}

pub async fn open_engine(
    clock: &Arc<ManualClock>,
    presence: &Arc<ScriptedPresence>,
    store: Arc<dyn PersistenceStore>,
) -> ReconciliationEngine {
    ReconciliationEngine::open(
        ACCOUNT,
        quiet_config(),
        presence.clone(),
        store,
        clock.clone(),
    )
    .await
}

/// Polls `condition` on real time until it holds or two seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
