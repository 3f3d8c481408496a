//! Usage Ledger
//!
//! In-memory log of dispatched requests plus the persisted row it is
//! synchronized with. The log holds the trailing 24 hours of dispatches, so
//! the per-minute window stays intact across UTC midnight; the daily count
//! only looks at entries since midnight.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::config::USAGE_ROW_ID;
use super::gate::MINUTE_WINDOW;

/// How long dispatched requests stay in the log
pub const LOG_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// One dispatched request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Dispatch start, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Model the request was sent to
    pub model: String,
}

/// Persisted usage row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Singleton key
    #[serde(default = "default_row_id")]
    pub id: String,

    /// Requests dispatched on `last_reset_date`
    pub requests_today: u32,

    /// UTC calendar day the counters belong to
    pub last_reset_date: NaiveDate,

    /// Dispatches from the trailing 24 hours, oldest first
    #[serde(default)]
    pub request_log: Vec<RequestLogEntry>,

    /// Time of the last write
    pub updated_at: DateTime<Utc>,
}

fn default_row_id() -> String {
    USAGE_ROW_ID.to_string()
}

impl UsageRecord {
    /// Empty row for a new day
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            id: default_row_id(),
            requests_today: 0,
            last_reset_date: now.date_naive(),
            request_log: Vec::new(),
            updated_at: now,
        }
    }
}

/// UTC midnight starting the day that contains `now`
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// In-memory request log
#[derive(Debug, Clone)]
pub struct UsageLedger {
    /// Entries ordered by timestamp
    log: VecDeque<RequestLogEntry>,

    /// Anchor of the minimum-interval rule
    last_request_at: Option<DateTime<Utc>>,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self {
            log: VecDeque::new(),
            last_request_at: None,
        }
    }

    /// Rebuild the ledger from a persisted row
    ///
    /// A row from another day is reset: only entries still inside the
    /// trailing minute survive, so a restart just after midnight keeps the
    /// per-minute budget, and its newest entry stays the cooldown anchor.
    /// Entries stamped later than `now` are clamped to `now` so they keep
    /// counting against every budget.
    pub fn from_record(record: &UsageRecord, now: DateTime<Utc>) -> Self {
        let mut ledger = Self::new();
        ledger.last_request_at = record
            .request_log
            .iter()
            .map(|entry| entry.timestamp.min(now))
            .max();

        let cutoff = if record.last_reset_date == now.date_naive() {
            now - chrono_duration(LOG_RETENTION)
        } else {
            now - chrono_duration(MINUTE_WINDOW)
        };

        let mut entries: Vec<RequestLogEntry> = record
            .request_log
            .iter()
            .cloned()
            .map(|mut entry| {
                if entry.timestamp > now {
                    entry.timestamp = now;
                }
                entry
            })
            .filter(|entry| entry.timestamp > cutoff)
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);

        ledger.log = entries.into();
        ledger
    }

    /// Append a dispatched request
    pub fn record_request(&mut self, at: DateTime<Utc>, model: impl Into<String>) {
        let entry = RequestLogEntry {
            timestamp: at,
            model: model.into(),
        };

        // Keep ordering even if the wall clock stepped backwards.
        let pos = self
            .log
            .iter()
            .rposition(|existing| existing.timestamp <= at)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.log.insert(pos, entry);

        self.last_request_at = Some(match self.last_request_at {
            Some(last) if last > at => last,
            _ => at,
        });
    }

    /// Add entries of `other` that are missing here
    ///
    /// Used when reloading after a failed persist, so dispatches that never
    /// reached the store keep counting. Stale entries go on the next prune.
    pub fn absorb(&mut self, other: &UsageLedger) {
        for entry in other.entries() {
            if !self.log.contains(entry) {
                self.record_request(entry.timestamp, entry.model.clone());
            }
        }
        self.last_request_at = match (self.last_request_at, other.last_request_at) {
            (Some(ours), Some(theirs)) => Some(ours.max(theirs)),
            (ours, theirs) => ours.or(theirs),
        };
    }

    /// Drop entries older than 24 hours
    ///
    /// Returns the number of entries removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono_duration(LOG_RETENTION);
        let before = self.log.len();
        while matches!(self.log.front(), Some(entry) if entry.timestamp < cutoff) {
            self.log.pop_front();
        }
        before - self.log.len()
    }

    /// Requests dispatched since UTC midnight
    pub fn requests_today(&self, now: DateTime<Utc>) -> u32 {
        let cutoff = start_of_day(now);
        self.log.iter().filter(|e| e.timestamp >= cutoff).count() as u32
    }

    /// Requests dispatched in the trailing `window`
    pub fn requests_in_window(&self, now: DateTime<Utc>, window: Duration) -> u32 {
        self.window_timestamps(now, window).len() as u32
    }

    /// Timestamps inside the trailing `window`, oldest first
    pub fn window_timestamps(&self, now: DateTime<Utc>, window: Duration) -> Vec<DateTime<Utc>> {
        let cutoff = now - chrono_duration(window);
        self.log
            .iter()
            .map(|entry| entry.timestamp)
            .filter(|ts| *ts > cutoff)
            .collect()
    }

    /// Start of the most recent dispatch
    pub fn last_request_at(&self) -> Option<DateTime<Utc>> {
        self.last_request_at
    }

    /// Logged entries, oldest first
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &RequestLogEntry> + '_ {
        self.log.iter()
    }

    /// Number of logged entries
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Row to persist for the state at `now`
    ///
    /// `requests_today` counts since midnight; the log carries the whole
    /// retained window.
    pub fn snapshot(&self, now: DateTime<Utc>) -> UsageRecord {
        let cutoff = now - chrono_duration(LOG_RETENTION);
        let request_log: Vec<RequestLogEntry> = self
            .log
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .cloned()
            .collect();

        UsageRecord {
            id: default_row_id(),
            requests_today: self.requests_today(now),
            last_reset_date: now.date_naive(),
            request_log,
            updated_at: now,
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
