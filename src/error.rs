//! Gate Error Types
//!
//! This module defines the errors a caller of the rate-gated queue can see,
//! and the errors a usage store can raise.

/// Errors returned to callers of the admission queue
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The daily request budget is exhausted until the calendar date rolls over
    #[error("DAILY_LIMIT_REACHED")]
    DailyLimitReached,

    /// The usage ledger is not loaded, or could not be persisted
    #[error("Rate limiter unavailable: {0}")]
    Unavailable(String),

    /// The request ran but its usage could not be written back
    #[error("Failed to persist usage data. Request blocked for safety.")]
    PersistFailed,

    /// The wrapped provider call itself failed
    #[error("Request execution failed: {0}")]
    Execution(#[source] anyhow::Error),

    /// The service stopped while the request was still queued
    #[error("Rate limiter is shutting down")]
    ShuttingDown,
}

impl GateError {
    /// Short, stable label used for metrics and HTTP mapping
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::DailyLimitReached => "daily_limit",
            GateError::Unavailable(_) => "unavailable",
            GateError::PersistFailed => "persist_failed",
            GateError::Execution(_) => "execution",
            GateError::ShuttingDown => "shutting_down",
        }
    }

    /// Whether the caller should switch to its non-AI path instead of retrying
    pub fn is_quota_related(&self) -> bool {
        matches!(
            self,
            GateError::DailyLimitReached | GateError::Unavailable(_) | GateError::PersistFailed
        )
    }
}

/// Errors raised by usage store backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem error
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be (de)serialized
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("Store SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Blocking task failed to complete
    #[error("Store task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Stored row is malformed
    #[error("Corrupt usage record: {0}")]
    Corrupt(String),

    /// Backend refused the operation (used by test doubles and outages)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_limit_message_is_stable() {
        assert_eq!(GateError::DailyLimitReached.to_string(), "DAILY_LIMIT_REACHED");
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(GateError::DailyLimitReached.reason(), "daily_limit");
        assert_eq!(GateError::PersistFailed.reason(), "persist_failed");
        assert_eq!(
            GateError::Execution(anyhow::anyhow!("boom")).reason(),
            "execution"
        );
    }

    #[test]
    fn test_quota_related() {
        assert!(GateError::DailyLimitReached.is_quota_related());
        assert!(GateError::Unavailable("not loaded".into()).is_quota_related());
        assert!(!GateError::ShuttingDown.is_quota_related());
        assert!(!GateError::Execution(anyhow::anyhow!("503")).is_quota_related());
    }
}
