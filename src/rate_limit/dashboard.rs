//! Usage Dashboard Support
//!
//! Read-only views over the ledger: the per-call stats snapshot and the
//! fuller dashboard payload served over HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::RateLimitConfig;
use super::gate::{self, MINUTE_WINDOW};
use super::ledger::{RequestLogEntry, UsageLedger};
use super::manager::LedgerState;

/// Number of log entries included in the dashboard
pub const RECENT_REQUESTS: usize = 20;

/// A value per budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerBudget<T> {
    pub rpm: T,
    pub rpd: T,
}

/// Current utilization of the provider budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    /// Dispatches in the trailing 60 seconds
    pub requests_last_minute: u32,

    /// Dispatches since UTC midnight
    pub requests_today: u32,

    /// Configured budgets
    pub limits: PerBudget<u32>,

    /// Utilization of each budget, 0-100 (may exceed 100 after a restart)
    pub percentage_used: PerBudget<f64>,

    /// Whether the gate would admit a request right now
    pub can_make_request: bool,

    /// Requests waiting for admission
    pub queue_length: usize,
}

impl UsageStats {
    /// Compute the stats for `ledger` at `now`
    ///
    /// `ready` is false while the ledger is not loaded; the gate is closed
    /// then regardless of the counts.
    pub fn compute(
        limits: &RateLimitConfig,
        ledger: &UsageLedger,
        now: DateTime<Utc>,
        ready: bool,
        queue_length: usize,
    ) -> Self {
        let requests_last_minute = ledger.requests_in_window(now, MINUTE_WINDOW);
        let requests_today = ledger.requests_today(now);

        Self {
            requests_last_minute,
            requests_today,
            limits: PerBudget {
                rpm: limits.rpm,
                rpd: limits.rpd,
            },
            percentage_used: PerBudget {
                rpm: percent(requests_last_minute, limits.rpm),
                rpd: percent(requests_today, limits.rpd),
            },
            can_make_request: ready && gate::evaluate(limits, ledger, now).is_admit(),
            queue_length,
        }
    }

    /// Whether either budget is at or above `threshold_percent`
    pub fn exceeds(&self, threshold_percent: f64) -> bool {
        self.percentage_used.rpm >= threshold_percent
            || self.percentage_used.rpd >= threshold_percent
    }
}

fn percent(used: u32, limit: u32) -> f64 {
    if limit == 0 {
        return 100.0;
    }
    f64::from(used) / f64::from(limit) * 100.0
}

/// Dashboard data for the admin interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: DateTime<Utc>,

    /// Ledger lifecycle state
    pub state: LedgerState,

    /// Budget utilization
    pub stats: UsageStats,

    /// Advisory fallback flag
    pub should_use_fallback: bool,

    /// Most recent dispatches, newest first
    pub recent_requests: Vec<RequestLogEntry>,

    /// Active budgets
    pub config: RateLimitConfig,
}

impl DashboardData {
    /// Assemble the dashboard from a ledger snapshot
    pub fn build(
        limits: &RateLimitConfig,
        ledger: &UsageLedger,
        now: DateTime<Utc>,
        state: LedgerState,
        queue_length: usize,
    ) -> Self {
        let ready = state == LedgerState::Ready;
        let stats = UsageStats::compute(limits, ledger, now, ready, queue_length);
        let should_use_fallback = !ready || stats.exceeds(limits.fallback_threshold_percent);
        let recent_requests = ledger
            .entries()
            .rev()
            .take(RECENT_REQUESTS)
            .cloned()
            .collect();

        Self {
            timestamp: now,
            state,
            stats,
            should_use_fallback,
            recent_requests,
            config: limits.clone(),
        }
    }
}
