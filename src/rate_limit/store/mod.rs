//! Usage Store
//!
//! Persistence for the singleton usage row. The rate limiter only needs to
//! load the row at startup and overwrite it afterwards, so the trait is
//! deliberately small.

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::config::{LedgerConfig, StoreBackend};
use super::ledger::UsageRecord;
use crate::error::StoreError;

pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::JsonFileStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Backend holding the persisted usage row
#[async_trait]
pub trait UsageStore: Send + Sync + Debug {
    /// Fetch the row, `None` if it was never written
    async fn load(&self) -> Result<Option<UsageRecord>, StoreError>;

    /// Insert or overwrite the row
    async fn save(&self, record: &UsageRecord) -> Result<(), StoreError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Process-local store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    record: Arc<RwLock<Option<UsageRecord>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `record`
    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: Arc::new(RwLock::new(Some(record))),
        }
    }

    /// Current contents
    pub async fn current(&self) -> Option<UsageRecord> {
        self.record.read().await.clone()
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn load(&self) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), StoreError> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Default location for file-backed ledgers
///
/// Returns `~/.local/share/genai-gate/<file_name>` on Linux
pub fn default_data_path(file_name: &str) -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "genai-gate", "genai-gate") {
        proj_dirs.data_dir().join(file_name)
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("genai-gate")
            .join(file_name)
    }
}

/// Build the store selected by the ledger configuration
pub fn open_store(config: &LedgerConfig) -> anyhow::Result<Arc<dyn UsageStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| default_data_path("usage.json"));
            Ok(Arc::new(JsonFileStore::new(path)))
        }
        #[cfg(feature = "sqlite")]
        StoreBackend::Sqlite => {
            let path = config
                .path
                .clone()
                .unwrap_or_else(|| default_data_path("usage.db"));
            Ok(Arc::new(SqliteStore::new(path)))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreBackend::Sqlite => {
            anyhow::bail!("SQLite ledger backend requires the `sqlite` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_store_starts_empty() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryStore::new();
        let mut record = UsageRecord::fresh(Utc::now());
        store.save(&record).await.unwrap();

        record.requests_today = 7;
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.requests_today, 7);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.save(&UsageRecord::fresh(Utc::now())).await.unwrap();
        assert!(clone.current().await.is_some());
    }

    #[test]
    fn test_open_memory_store() {
        let store = open_store(&LedgerConfig::in_memory()).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_open_file_store_with_path() {
        let config = LedgerConfig {
            backend: StoreBackend::File,
            path: Some(PathBuf::from("/tmp/genai-gate-test/usage.json")),
            ..LedgerConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "file");
    }

    #[test]
    fn test_default_data_path() {
        assert!(default_data_path("usage.db").ends_with("usage.db"));
    }
}
