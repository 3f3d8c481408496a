//! JSON state-file store
//!
//! Keeps the usage row as a single pretty-printed JSON document. Writes go
//! to a sibling `.tmp` file first and are renamed into place; saves are
//! serialized so two writers never share the temp file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::UsageStore;
use crate::error::StoreError;
use crate::rate_limit::ledger::UsageRecord;

/// File-backed usage store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Create a store at `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UsageStore for JsonFileStore {
    async fn load(&self) -> Result<Option<UsageRecord>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec_pretty(record)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &payload).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::ledger::RequestLogEntry;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("usage.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("usage.json"));

        let now = Utc::now();
        let mut record = UsageRecord::fresh(now);
        record.request_log.push(RequestLogEntry {
            timestamp: now,
            model: "gemini-2.5-flash".to_string(),
        });
        record.requests_today = 1;
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.requests_today, 1);
        assert_eq!(loaded.request_log.len(), 1);
        assert_eq!(loaded.request_log[0].model, "gemini-2.5-flash");
        assert_eq!(
            loaded.request_log[0].timestamp.timestamp_millis(),
            now.timestamp_millis()
        );
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_all_succeed() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("usage.json"));

        let saves = (0..16u32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut record = UsageRecord::fresh(Utc::now());
                record.requests_today = i;
                store.save(&record).await
            })
        });
        for handle in futures::future::join_all(saves).await {
            handle.unwrap().unwrap();
        }

        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.requests_today < 16);
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = JsonFileStore::new(path);
        assert!(matches!(store.load().await, Err(StoreError::Json(_))));
    }
}
