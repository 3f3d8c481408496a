//! Retry Logic for Ledger I/O
//!
//! Bounded retries with fixed, linear or exponential backoff, used when
//! loading the usage ledger at startup and when persisting it.
//!
//! # Example
//!
//! ```ignore
//! use genai_gate::rate_limit::retry::{Backoff, RetryConfig, retry_with_backoff};
//!
//! let config = RetryConfig::new()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_secs(1))
//!     .backoff(Backoff::Fixed);
//!
//! let record = retry_with_backoff(&config, "load usage", || store.load()).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay every time
    Fixed,
    /// base, 2×base, 3×base, ...
    Linear,
    /// base, 2×base, 4×base, ...
    Exponential,
}

/// Retry configuration
///
/// # Fields
///
/// * `max_attempts` - Total attempts including the first one
/// * `base_delay_ms` - Delay after the first failure
/// * `max_delay_ms` - Upper bound on any single delay
/// * `backoff` - Growth of the delay between attempts
/// * `jitter` - Random delay variation factor (0.0 disables it)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: usize,

    /// Base delay before first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries, in milliseconds
    pub max_delay_ms: u64,

    /// Delay growth
    pub backoff: Backoff,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff: Backoff::Fixed,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the base delay between retries
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the maximum delay between retries
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the backoff shape
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the jitter factor
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the zero-indexed failed `attempt`
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let base = Duration::from_millis(self.base_delay_ms);
        let delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(attempt as u32 + 1),
            Backoff::Exponential => base.saturating_mul(2_u32.saturating_pow(attempt as u32)),
        };

        let delay = if self.jitter > 0.0 {
            let jitter_range = delay.mul_f64(self.jitter);
            let offset = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range.as_secs_f64();
            if offset >= 0.0 {
                delay.saturating_add(Duration::from_secs_f64(offset))
            } else {
                delay.saturating_sub(Duration::from_secs_f64(-offset))
            }
        } else {
            delay
        };

        delay.min(Duration::from_millis(self.max_delay_ms))
    }
}

/// Retry an operation until it succeeds or `max_attempts` is used up
///
/// Every error is treated as transient. Returns the last error when all
/// attempts fail.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        "{} succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        attempts
                    );
                }
                return Ok(result);
            }
            Err(e) if attempt + 1 < attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    attempts,
                    e
                );
                let delay = config.calculate_delay(attempt);
                tracing::debug!("Waiting {:?} before retry", delay);
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    "{} failed after {} attempts: {}",
                    operation_name,
                    attempts,
                    e
                );
                return Err(e);
            }
        }
    }
}
