//! Rate Limit Configuration
//!
//! Budgets enforced by the gate, and how the usage ledger is stored and
//! synchronized.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::retry::{Backoff, RetryConfig};

/// Default provider budgets (Gemini free tier)
pub const DEFAULT_RPM: u32 = 8; // requests per minute
pub const DEFAULT_RPD: u32 = 200; // requests per calendar day
pub const DEFAULT_MIN_REQUEST_INTERVAL_MS: u64 = 8000;
pub const DEFAULT_FALLBACK_THRESHOLD_PERCENT: f64 = 90.0;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Fixed key of the singleton usage row
pub const USAGE_ROW_ID: &str = "genai_usage_singleton";

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed in any trailing 60-second window
    pub rpm: u32,

    /// Requests allowed per UTC calendar day
    pub rpd: u32,

    /// Minimum spacing between two dispatches
    pub min_request_interval_ms: u64,

    /// Utilization (percent of either budget) at which callers should
    /// switch to their heuristic path
    pub fallback_threshold_percent: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm: DEFAULT_RPM,
            rpd: DEFAULT_RPD,
            min_request_interval_ms: DEFAULT_MIN_REQUEST_INTERVAL_MS,
            fallback_threshold_percent: DEFAULT_FALLBACK_THRESHOLD_PERCENT,
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with explicit budgets
    pub fn with_limits(rpm: u32, rpd: u32, min_request_interval: Duration) -> Self {
        Self {
            rpm,
            rpd,
            min_request_interval_ms: min_request_interval.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Apply `GENAI_GATE_*` overrides on top of this configuration
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("GENAI_GATE_RPM") {
            if let Ok(limit) = val.parse() {
                self.rpm = limit;
            }
        }

        if let Ok(val) = std::env::var("GENAI_GATE_RPD") {
            if let Ok(limit) = val.parse() {
                self.rpd = limit;
            }
        }

        if let Ok(val) = std::env::var("GENAI_GATE_MIN_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.min_request_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("GENAI_GATE_FALLBACK_PERCENT") {
            if let Ok(pct) = val.parse::<f64>() {
                if pct > 0.0 && pct <= 100.0 {
                    self.fallback_threshold_percent = pct;
                }
            }
        }

        self
    }

    /// Minimum spacing between dispatches
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// Validate the budgets
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpm == 0 {
            anyhow::bail!("limits.rpm must be > 0");
        }
        if self.rpd == 0 {
            anyhow::bail!("limits.rpd must be > 0");
        }
        if !(self.fallback_threshold_percent > 0.0 && self.fallback_threshold_percent <= 100.0) {
            anyhow::bail!("limits.fallback_threshold_percent must be in (0, 100]");
        }
        Ok(())
    }
}

/// Which backend holds the usage row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on exit
    Memory,
    /// JSON state file
    File,
    /// SQLite database
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" | "json" => Ok(StoreBackend::File),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => anyhow::bail!("Unknown ledger backend: {}. Must be memory, file or sqlite", other),
        }
    }
}

/// Usage ledger storage and synchronization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Storage backend
    pub backend: StoreBackend,

    /// File or database path (file and sqlite backends)
    pub path: Option<PathBuf>,

    /// Interval of the background resync
    pub sync_interval_secs: u64,

    /// Retry policy for loading the ledger at startup
    pub load_retry: RetryConfig,

    /// Retry policy for persisting the ledger
    pub persist_retry: RetryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            load_retry: RetryConfig::new()
                .max_attempts(5)
                .base_delay(Duration::from_secs(2))
                .max_delay(Duration::from_secs(10))
                .backoff(Backoff::Linear),
            persist_retry: RetryConfig::new()
                .max_attempts(3)
                .base_delay(Duration::from_secs(1))
                .max_delay(Duration::from_secs(1))
                .backoff(Backoff::Fixed),
        }
    }
}

impl LedgerConfig {
    /// In-memory ledger (for testing)
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            ..Self::default()
        }
    }

    /// Background resync interval
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Validate the ledger settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_interval_secs == 0 {
            anyhow::bail!("ledger.sync_interval_secs must be > 0");
        }
        if self.load_retry.max_attempts == 0 || self.persist_retry.max_attempts == 0 {
            anyhow::bail!("ledger retry policies need at least one attempt");
        }
        Ok(())
    }
}
