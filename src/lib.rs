//! GenAI Gate Library
//!
//! Rate-gated FIFO request queue for a generative-AI provider with a small
//! free-tier budget. Usage is kept in a persisted ledger so the per-minute,
//! per-day and minimum-interval budgets hold across restarts, and every
//! failure to read or write that ledger closes the gate.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod server;

pub use client::{GatedClient, GeminiClient, GenerateContentRequest, GenerateContentResponse, GenerativeClient};
pub use error::{GateError, StoreError};
pub use rate_limit::{LedgerState, RateLimiter, UsageStats};
