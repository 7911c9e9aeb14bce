//! Retry, backoff and jitter policy shared by submission and health probes.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Quadratic backoff: the wait after attempt `n` (1-based) is `n² × unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_unit: Duration::from_millis(config.backoff_unit_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }

    /// Delay to wait after a failed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_mul(attempt))
    }

    /// Backoff for every attempt `1..=max_attempts`.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|a| self.backoff(a)).collect()
    }

    /// Whether another attempt follows `attempt`. No sleep is taken after the
    /// final attempt.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Uniform random delay in `0..=max_jitter`.
    pub fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
