//! Wall-clock abstraction
//!
//! The gate reasons in wall-clock time (calendar days, epoch-millisecond log
//! entries), while waiting is done with tokio timers. `MonotonicClock` ties
//! the two together so tests running on a paused tokio runtime see a
//! consistent, deterministic wall clock.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::time::Duration;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with tokio's (possibly paused) timer
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin_wall: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    /// Start the clock at `wall`, advancing from the current tokio instant
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall: wall,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_wall + elapsed
    }
}

/// Time left until `until`, zero if it already passed
pub fn duration_until(now: DateTime<Utc>, until: DateTime<Utc>) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test(start_paused = true)]
    async fn test_monotonic_clock_follows_tokio_time() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 0).unwrap();
        let clock = MonotonicClock::starting_at(start);
        assert_eq!(clock.now(), start);

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
        assert_eq!(clock.now().date_naive().to_string(), "2026-03-15");
    }

    #[test]
    fn test_duration_until_past_is_zero() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let earlier = now - chrono::Duration::seconds(5);
        assert_eq!(duration_until(now, earlier), Duration::ZERO);
        assert_eq!(
            duration_until(earlier, now),
            Duration::from_secs(5)
        );
    }
}
