//! Rate Limiting Module
//!
//! Rate-gated FIFO queue in front of a generative-AI provider with a small
//! free-tier budget. Every outbound call is admitted only when the daily
//! budget, the trailing-minute budget and the minimum spacing all allow it,
//! and usage survives restarts through a persisted ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RateLimiter                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  submit() ──► FIFO queue ──► drain loop ──► execute          │
//! │                                  │             │            │
//! │                              gate::evaluate    record + sync │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Usage ledger (in-memory + UsageStore)         │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dashboard;
pub mod gate;
pub mod ledger;
pub mod manager;
pub(crate) mod queue;
pub mod retry;
pub mod store;

pub use config::{LedgerConfig, RateLimitConfig, StoreBackend};
pub use dashboard::{DashboardData, UsageStats};
pub use gate::{DenyReason, GateDecision};
pub use ledger::{RequestLogEntry, UsageLedger, UsageRecord};
pub use manager::{LedgerState, RateLimiter};
pub use retry::{Backoff, RetryConfig};
pub use store::{open_store, JsonFileStore, MemoryStore, UsageStore};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
