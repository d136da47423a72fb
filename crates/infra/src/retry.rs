//! Backoff for the two places that retry work: the transaction runner
//! (commit conflicts) and the queue worker (redelivery of tasks that were not
//! ready yet).
//!
//! Attempts are counted from 1. A policy without a limit keeps retrying, with
//! the delay capped at `max_delay`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always wait `base_delay`.
    Constant,
    /// `base_delay` doubled after every failed attempt, up to `max_delay`.
    Doubling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed in total, or `None` to retry until success.
    pub limit: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(limit: u32, delay: Duration) -> Self {
        Self {
            limit: Some(limit),
            base_delay: delay,
            max_delay: delay,
            backoff: Backoff::Constant,
        }
    }

    pub fn exponential(limit: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            limit: Some(limit),
            base_delay,
            max_delay,
            backoff: Backoff::Doubling,
        }
    }

    pub fn unbounded(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            limit: None,
            base_delay,
            max_delay,
            backoff: Backoff::Doubling,
        }
    }

    /// Same delays, different limit; `0` lifts the limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.limit.is_none()
    }

    /// Wait before the attempt that follows `failed` failed attempts.
    pub fn delay_for_attempt(&self, failed: u32) -> Duration {
        if failed == 0 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Constant => self.base_delay,
            Backoff::Doubling => {
                let factor = 1u32 << (failed - 1).min(31);
                self.base_delay
                    .checked_mul(factor)
                    .map_or(self.max_delay, |delay| delay.min(self.max_delay))
            }
        }
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        self.limit.is_none_or(|limit| attempts_made < limit)
    }
}
