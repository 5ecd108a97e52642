//! Retry decisions and exponential backoff for pipeline jobs
//!
//! Only the forecast fetch stage is retried, and only for transient errors.
//! Analysis failures and fatal fetch failures are final.

use rand::RngExt;
use std::time::Duration;

use super::JobStage;
use crate::config::PipelineConfig;
use crate::error::ErrorKind;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 3_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt)
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Spread delays by ±10% so retries of many trips do not line up
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_fetch_attempts,
            initial_delay: config.initial_backoff(),
            max_delay: config.max_backoff(),
            jitter: true,
        }
    }

    /// Retry without waiting; used in tests and for manual re-runs
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Whether a failed `attempt` (1-based) of `stage` gets another try
    #[must_use]
    pub fn should_retry(&self, stage: JobStage, kind: ErrorKind, attempt: u32) -> bool {
        stage == JobStage::Fetch && kind == ErrorKind::Transient && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let jitter: f64 = rand::rng().random_range(0.9..1.1);
            delay.mul_f64(jitter)
        } else {
            delay
        }
    }
}
