//! Durable key → JSON storage port.
//!
//! The engine only ever reads and writes whole records by key. Two record
//! kinds exist: one `DayLog` per local day and a single `ActiveState` that
//! mirrors the full in-memory state for crash recovery.

pub mod memory;
pub mod records;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::DayKey;

pub use memory::MemoryStore;
pub use records::{ActiveState, DayLog};

pub const ACTIVE_STATE_KEY: &str = "active_state";
pub const DAY_LOG_PREFIX: &str = "day_log:";

pub fn day_log_key(day: DayKey) -> String {
    format!("{DAY_LOG_PREFIX}{day}")
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Value>>;

    async fn write(&self, key: &str, value: Value) -> Result<()>;
}
