//! Retry delays for failed jobs and wait times for the acquisition loop.

use std::time::Duration;

use runway_core::config::{JobExecutorConfig, RetryBackoffConfig};
use runway_core::{AppError, AppResult};

/// Delay before a failed job becomes due again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBackoff {
    /// The same delay after every failure.
    Fixed {
        /// Delay.
        delay: Duration,
    },
    /// `base * factor^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Growth factor.
        factor: u32,
        /// Ceiling.
        max: Duration,
    },
}

impl RetryBackoff {
    /// Build from configuration.
    pub fn from_config(config: &RetryBackoffConfig) -> AppResult<Self> {
        let base = Duration::from_secs(config.base_delay_seconds);
        match config.strategy.as_str() {
            "fixed" => Ok(Self::Fixed { delay: base }),
            "exponential" => Ok(Self::Exponential {
                base,
                factor: config.factor.max(1),
                max: Duration::from_secs(config.max_delay_seconds).max(base),
            }),
            other => Err(AppError::configuration(format!(
                "Unknown retry backoff strategy '{other}'"
            ))),
        }
    }

    /// Delay after the `attempt`-th failure (1-based). Never decreases as
    /// `attempt` grows.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1);
                let multiplier = factor.checked_pow(exponent).unwrap_or(u32::MAX);
                base.checked_mul(multiplier).unwrap_or(max).min(max)
            }
        }
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self::Fixed {
            delay: Duration::ZERO,
        }
    }
}

/// Wait between acquisition rounds.
///
/// Consecutive empty rounds multiply the wait up to the ceiling; a round
/// that claims anything resets it to the base interval.
#[derive(Debug, Clone)]
pub struct AcquisitionBackoff {
    base: Duration,
    max: Duration,
    factor: u32,
    current: Duration,
}

impl AcquisitionBackoff {
    /// Create from base wait, ceiling, and growth factor.
    pub fn new(base: Duration, max: Duration, factor: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            factor: factor.max(1),
            current: base,
        }
    }

    /// Build from the executor configuration.
    pub fn from_config(config: &JobExecutorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.wait_time_ms),
            Duration::from_millis(config.max_wait_ms),
            config.wait_increase_factor,
        )
    }

    /// Wait before the next round, given how many jobs this round claimed.
    pub fn next_wait(&mut self, acquired: usize) -> Duration {
        if acquired > 0 {
            self.current = self.base;
            return self.base;
        }
        let wait = self.current;
        self.current = self
            .current
            .checked_mul(self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        wait
    }

    /// Return to the base interval.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
