//! SQLite usage store
//!
//! One row in `genai_usage`, keyed by the fixed singleton id. The request
//! log is kept as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::OptionalExtension;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::UsageStore;
use crate::error::StoreError;
use crate::rate_limit::config::USAGE_ROW_ID;
use crate::rate_limit::ledger::{RequestLogEntry, UsageRecord};

/// SQLite-backed usage store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Create a store backed by the database at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Database location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UsageStore for SqliteStore {
    async fn load(&self) -> Result<Option<UsageRecord>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<UsageRecord>, StoreError> {
            let conn = open_connection(&path)?;
            init_schema(&conn)?;

            let row = conn
                .query_row(
                    "SELECT requests_today, last_reset_date, request_log, updated_at
                     FROM genai_usage WHERE id = ?1",
                    rusqlite::params![USAGE_ROW_ID],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((requests_today, last_reset_date, request_log, updated_at)) = row else {
                return Ok(None);
            };

            let last_reset_date = NaiveDate::parse_from_str(&last_reset_date, "%Y-%m-%d")
                .map_err(|e| StoreError::Corrupt(format!("last_reset_date: {}", e)))?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|e| StoreError::Corrupt(format!("updated_at: {}", e)))?
                .with_timezone(&Utc);
            let request_log: Vec<RequestLogEntry> = serde_json::from_str(&request_log)?;

            Ok(Some(UsageRecord {
                id: USAGE_ROW_ID.to_string(),
                requests_today: u32::try_from(requests_today.max(0)).unwrap_or(u32::MAX),
                last_reset_date,
                request_log,
                updated_at,
            }))
        })
        .await?
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let path = self.path.clone();
        let requests_today = i64::from(record.requests_today);
        let last_reset_date = record.last_reset_date.format("%Y-%m-%d").to_string();
        let request_log = serde_json::to_string(&record.request_log)?;
        let updated_at = record.updated_at.to_rfc3339();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = open_connection(&path)?;
            init_schema(&conn)?;
            conn.execute(
                "INSERT INTO genai_usage (id, requests_today, last_reset_date, request_log, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   requests_today = excluded.requests_today,
                   last_reset_date = excluded.last_reset_date,
                   request_log = excluded.request_log,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    USAGE_ROW_ID,
                    requests_today,
                    last_reset_date,
                    request_log,
                    updated_at
                ],
            )?;
            Ok(())
        })
        .await?
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn open_connection(path: &Path) -> Result<rusqlite::Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS genai_usage (
            id TEXT PRIMARY KEY,
            requests_today INTEGER NOT NULL DEFAULT 0,
            last_reset_date TEXT NOT NULL,
            request_log TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_database_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("usage.db"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_singleton_row() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("usage.db"));
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 9, 30, 0).unwrap();

        let mut record = UsageRecord::fresh(now);
        store.save(&record).await.unwrap();

        record.request_log.push(RequestLogEntry {
            timestamp: now,
            model: "gemini-2.5-flash".to_string(),
        });
        record.requests_today = 1;
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let conn = rusqlite::Connection::open(store.path()).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM genai_usage", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_corrupt_date_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("usage.db"));
        store.save(&UsageRecord::fresh(Utc::now())).await.unwrap();

        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute("UPDATE genai_usage SET last_reset_date = 'yesterday'", [])
            .unwrap();

        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }
}
