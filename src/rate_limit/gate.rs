//! Rate Gate
//!
//! Pure admission predicate over the usage ledger. A call may proceed only
//! when all three budgets allow it:
//!
//! - fewer than `rpd` requests today
//! - fewer than `rpm` requests in the trailing 60 seconds
//! - at least `min_request_interval` since the last dispatch
//!
//! A denial carries the exact instant the blocking condition clears, so the
//! drain loop can sleep until then instead of polling.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::config::RateLimitConfig;
use super::ledger::UsageLedger;

/// Length of the per-minute window
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Why the gate asked the caller to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Minimum inter-request interval not yet elapsed
    Cooldown,
    /// Trailing-minute budget exhausted
    MinuteWindow,
}

impl DenyReason {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Cooldown => "cooldown",
            DenyReason::MinuteWindow => "minute_window",
        }
    }
}

/// Outcome of a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Dispatch now
    Admit,
    /// Dispatch becomes possible at `until`
    Wait {
        until: DateTime<Utc>,
        reason: DenyReason,
    },
    /// No more dispatches before the next UTC day
    DailyLimitReached,
}

impl GateDecision {
    /// Whether a dispatch may start now
    pub fn is_admit(&self) -> bool {
        matches!(self, GateDecision::Admit)
    }
}

/// Evaluate the budgets at `now`
///
/// A zero budget never admits; it is reported as `DailyLimitReached` so
/// callers fail fast instead of waiting forever.
pub fn evaluate(limits: &RateLimitConfig, ledger: &UsageLedger, now: DateTime<Utc>) -> GateDecision {
    if limits.rpm == 0 || ledger.requests_today(now) >= limits.rpd {
        return GateDecision::DailyLimitReached;
    }

    let mut blocked: Option<(DateTime<Utc>, DenyReason)> = None;

    let in_window = ledger.window_timestamps(now, MINUTE_WINDOW);
    let rpm = limits.rpm as usize;
    if in_window.len() >= rpm {
        // The window has room again once the oldest surplus entry ages out.
        let idx = in_window.len() - rpm;
        let until = in_window[idx] + minute_window();
        blocked = Some((until, DenyReason::MinuteWindow));
    }

    if let Some(last) = ledger.last_request_at() {
        let interval = chrono::Duration::from_std(limits.min_request_interval())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let ready_at = last + interval;
        if ready_at > now {
            blocked = match blocked {
                Some((until, reason)) if until >= ready_at => Some((until, reason)),
                _ => Some((ready_at, DenyReason::Cooldown)),
            };
        }
    }

    match blocked {
        Some((until, reason)) => GateDecision::Wait { until, reason },
        None => GateDecision::Admit,
    }
}

fn minute_window() -> chrono::Duration {
    chrono::Duration::seconds(MINUTE_WINDOW.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_empty_ledger_admits() {
        let limits = RateLimitConfig::default();
        let ledger = UsageLedger::new();
        assert_eq!(evaluate(&limits, &ledger, t0()), GateDecision::Admit);
    }

    #[test]
    fn test_cooldown_wait_until_interval_elapses() {
        let limits = RateLimitConfig::default();
        let mut ledger = UsageLedger::new();
        ledger.record_request(t0(), "m");

        let decision = evaluate(&limits, &ledger, t0() + secs(3));
        assert_eq!(
            decision,
            GateDecision::Wait {
                until: t0() + secs(8),
                reason: DenyReason::Cooldown
            }
        );
        assert!(evaluate(&limits, &ledger, t0() + secs(8)).is_admit());
    }

    #[test]
    fn test_minute_window_wait() {
        let limits = RateLimitConfig::with_limits(2, 100, Duration::from_secs(1));
        let mut ledger = UsageLedger::new();
        ledger.record_request(t0(), "m");
        ledger.record_request(t0() + secs(10), "m");

        let decision = evaluate(&limits, &ledger, t0() + secs(20));
        assert_eq!(
            decision,
            GateDecision::Wait {
                until: t0() + secs(60),
                reason: DenyReason::MinuteWindow
            }
        );
        assert!(evaluate(&limits, &ledger, t0() + secs(60)).is_admit());
    }

    #[test]
    fn test_later_constraint_wins() {
        // Window clears at +60s but cooldown only at +65s.
        let limits = RateLimitConfig::with_limits(1, 100, Duration::from_secs(65));
        let mut ledger = UsageLedger::new();
        ledger.record_request(t0(), "m");

        let decision = evaluate(&limits, &ledger, t0() + secs(1));
        assert_eq!(
            decision,
            GateDecision::Wait {
                until: t0() + secs(65),
                reason: DenyReason::Cooldown
            }
        );
    }

    #[test]
    fn test_daily_limit_is_terminal() {
        let limits = RateLimitConfig::with_limits(100, 3, Duration::ZERO);
        let mut ledger = UsageLedger::new();
        for i in 0..3 {
            ledger.record_request(t0() + secs(i), "m");
        }

        assert_eq!(
            evaluate(&limits, &ledger, t0() + secs(3600)),
            GateDecision::DailyLimitReached
        );

        // A new UTC day reopens the gate.
        let tomorrow = Utc.with_ymd_and_hms(2026, 7, 2, 0, 0, 0).unwrap();
        assert!(evaluate(&limits, &ledger, tomorrow).is_admit());
    }

    #[test]
    fn test_zero_budgets_never_admit() {
        let ledger = UsageLedger::new();
        let no_rpm = RateLimitConfig::with_limits(0, 100, Duration::from_secs(1));
        assert_eq!(evaluate(&no_rpm, &ledger, t0()), GateDecision::DailyLimitReached);

        let no_rpd = RateLimitConfig::with_limits(8, 0, Duration::from_secs(1));
        assert_eq!(evaluate(&no_rpd, &ledger, t0()), GateDecision::DailyLimitReached);
    }

    #[test]
    fn test_persisted_log_over_cap_stays_closed() {
        let limits = RateLimitConfig::with_limits(100, 2, Duration::ZERO);
        let mut ledger = UsageLedger::new();
        for i in 0..5 {
            ledger.record_request(t0() - secs(3600 + i), "m");
        }
        assert_eq!(evaluate(&limits, &ledger, t0()), GateDecision::DailyLimitReached);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    // Simulate a caller that always dispatches at the earliest instant the
    // gate allows, and check the budgets on the resulting schedule.
    fn schedule(limits: &RateLimitConfig, attempts: usize, start_offset: i64) -> Vec<DateTime<Utc>> {
        let mut now = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(start_offset);
        let mut ledger = UsageLedger::new();
        let mut dispatched = Vec::new();

        for _ in 0..attempts {
            loop {
                ledger.prune(now);
                match evaluate(limits, &ledger, now) {
                    GateDecision::Admit => break,
                    GateDecision::Wait { until, .. } => {
                        assert!(until > now, "wait must move time forward");
                        now = until;
                    }
                    GateDecision::DailyLimitReached => return dispatched,
                }
            }
            ledger.record_request(now, "m");
            dispatched.push(now);
        }
        dispatched
    }

    proptest! {
        #[test]
        fn prop_min_interval_respected(
            rpm in 1u32..20,
            interval_ms in 0u64..20_000,
            attempts in 1usize..40,
        ) {
            let limits = RateLimitConfig::with_limits(rpm, 1000, Duration::from_millis(interval_ms));
            let times = schedule(&limits, attempts, 0);
            for pair in times.windows(2) {
                let gap = (pair[1] - pair[0]).num_milliseconds();
                prop_assert!(gap >= interval_ms as i64);
            }
        }

        #[test]
        fn prop_minute_window_never_exceeds_rpm(
            rpm in 1u32..20,
            interval_ms in 0u64..5_000,
            attempts in 1usize..80,
        ) {
            let limits = RateLimitConfig::with_limits(rpm, 1000, Duration::from_millis(interval_ms));
            let times = schedule(&limits, attempts, 0);
            for (i, start) in times.iter().enumerate() {
                let in_window = times[i..]
                    .iter()
                    .filter(|t| **t - *start < chrono::Duration::seconds(60))
                    .count();
                prop_assert!(in_window <= rpm as usize);
            }
        }

        #[test]
        fn prop_minute_window_holds_across_midnight(
            rpm in 1u32..10,
            attempts in 1usize..30,
            start_offset in 86_280i64..86_400,
        ) {
            let limits = RateLimitConfig::with_limits(rpm, 1000, Duration::ZERO);
            let times = schedule(&limits, attempts, start_offset);
            for (i, start) in times.iter().enumerate() {
                let in_window = times[i..]
                    .iter()
                    .filter(|t| **t - *start < chrono::Duration::seconds(60))
                    .count();
                prop_assert!(in_window <= rpm as usize);
            }
        }

        #[test]
        fn prop_daily_budget_never_exceeded(
            rpd in 1u32..30,
            attempts in 1usize..60,
            start_offset in 0i64..86_000,
        ) {
            let limits = RateLimitConfig::with_limits(1000, rpd, Duration::ZERO);
            let times = schedule(&limits, attempts, start_offset);
            let first_day = times.first().map(|t| t.date_naive());
            let same_day = times.iter().filter(|t| Some(t.date_naive()) == first_day).count();
            prop_assert!(same_day <= rpd as usize);
        }
    }
}
