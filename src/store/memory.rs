use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::PersistenceStore;

/// Process-local store. Not durable; backs tests and hosts that bring their
/// own persistence and only need the engine's record shapes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.records).get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        lock(&self.records).insert(key.into(), value);
    }

    /// Keys in the order they were written.
    pub fn write_log(&self) -> Vec<String> {
        lock(&self.writes).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        self.insert(key, value);
        lock(&self.writes).push(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_replaces_and_is_logged() {
        let store = MemoryStore::new();
        store.write("k", json!({"v": 1})).await.unwrap();
        store.write("k", json!({"v": 2})).await.unwrap();

        assert_eq!(store.read("k").await.unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.read("missing").await.unwrap(), None);
        assert_eq!(store.write_log(), vec!["k".to_string(), "k".to_string()]);
    }
}
