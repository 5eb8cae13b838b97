use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{engine::EngineConfig, reconcile::ReconcileConfig};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub account_id: Option<String>,
    pub presence_url: String,
    pub poll_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub min_session_minutes: u32,
    pub backfill_cap_minutes: u32,
    pub max_lead_in_secs: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_id: None,
            presence_url: "http://127.0.0.1:8787".into(),
            poll_interval_secs: 60,
            fetch_timeout_secs: 10,
            write_timeout_secs: 5,
            min_session_minutes: 1,
            backfill_cap_minutes: 60,
            max_lead_in_secs: 120,
        }
    }
}

impl Settings {
    /// Zero intervals and timeouts are raised to one second.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            write_timeout: Duration::from_secs(self.write_timeout_secs.max(1)),
            reconcile: ReconcileConfig {
                min_session_minutes: self.min_session_minutes,
                backfill_cap_minutes: self.backfill_cap_minutes,
                max_lead_in: chrono::Duration::seconds(self.max_lead_in_secs.max(0)),
            },
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(account_id) = lookup("PLAYTALLY_ACCOUNT_ID").filter(|v| !v.trim().is_empty()) {
            self.account_id = Some(account_id.trim().to_string());
        }
        if let Some(url) = lookup("PLAYTALLY_PRESENCE_URL").filter(|v| !v.trim().is_empty()) {
            self.presence_url = url.trim().to_string();
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing file is created with defaults; a
    /// malformed one is ignored with a warning and left on disk untouched.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("Ignoring malformed settings in {}: {err}", path.display());
                    Settings::default()
                }
            }
        } else {
            let defaults = Settings::default();
            persist(&path, &defaults)?;
            defaults
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> Settings {
        self.read().clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.write();
        persist(&self.path, &settings)?;
        *guard = settings;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn persist(path: &Path, data: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}
