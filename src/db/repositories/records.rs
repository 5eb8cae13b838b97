use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::{db::Database, store::PersistenceStore};

impl Database {
    pub async fn read_record(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw = conn
                .query_row(
                    "SELECT value FROM records WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read record {key}"))?;
            Ok(raw)
        })
        .await
    }

    pub async fn write_record(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO records (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write record {key}"))?;
            Ok(())
        })
        .await
    }

    /// Keys starting with `prefix`, oldest first.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM records
                 WHERE key LIKE ?1 ESCAPE '\\'
                 ORDER BY key ASC",
            )?;

            let keys = stmt
                .query_map(params![pattern], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()
                .context("failed to list record keys")?;
            Ok(keys)
        })
        .await
    }
}

#[async_trait]
impl PersistenceStore for Database {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        match self.read_record(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .with_context(|| format!("record {key} is not valid JSON")),
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, value: Value) -> Result<()> {
        let raw = serde_json::to_string(&value)
            .with_context(|| format!("failed to encode record {key}"))?;
        self.write_record(key, raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> (tempfile::TempDir, Database) {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(temp_dir.path().join("playtally.sqlite3")).expect("db init");
        (temp_dir, db)
    }

    #[tokio::test]
    async fn write_then_read_replaces_value() {
        let (_dir, db) = open();

        db.write("active_state", json!({"totalMinutes": 3})).await.unwrap();
        db.write("active_state", json!({"totalMinutes": 7})).await.unwrap();

        let value = db.read("active_state").await.unwrap();
        assert_eq!(value, Some(json!({"totalMinutes": 7})));
        assert_eq!(db.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unparsable_record_is_an_error() {
        let (_dir, db) = open();

        db.write_record("active_state", "{not json".into()).await.unwrap();
        assert!(db.read("active_state").await.is_err());
    }

    #[tokio::test]
    async fn lists_keys_by_prefix() {
        let (_dir, db) = open();

        db.write("day_log:2026-03-15", json!({})).await.unwrap();
        db.write("day_log:2026-03-14", json!({})).await.unwrap();
        db.write("active_state", json!({})).await.unwrap();

        let keys = db.list_keys("day_log:").await.unwrap();
        assert_eq!(keys, vec!["day_log:2026-03-14", "day_log:2026-03-15"]);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("playtally.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.write("day_log:2026-03-14", json!({"totalMinutes": 12})).await.unwrap();
        }

        let reopened = Database::new(path).unwrap();
        assert_eq!(
            reopened.read("day_log:2026-03-14").await.unwrap(),
            Some(json!({"totalMinutes": 12}))
        );
    }
}
