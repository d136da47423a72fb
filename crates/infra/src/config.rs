//! Orchestration configuration, loaded from `LIGHT_*` environment variables.
//!
//! | Variable                     | Default | Meaning                                   |
//! |------------------------------|---------|-------------------------------------------|
//! | `LIGHT_TXN_MAX_ATTEMPTS`     | 64      | commit attempts per transaction; 0 = unbounded |
//! | `LIGHT_QUEUE_MAX_ATTEMPTS`   | 0       | deliveries per step task before dead-lettering; 0 = unbounded |
//! | `LIGHT_QUEUE_BASE_DELAY_MS`  | 500     | first redelivery delay (doubles per attempt, capped at 60s) |
//! | `LIGHT_WORKER_POLL_MS`       | 100     | worker sleep when the queue is idle       |

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::worker::WorkerConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationConfig {
    /// Retry policy for optimistic-concurrency conflicts on commit.
    pub transaction_retry: RetryPolicy,
    /// Redelivery policy for tasks that fail with a retriable error.
    pub queue_retry: RetryPolicy,
    pub worker: WorkerConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            transaction_retry: transaction_policy(64),
            queue_retry: RetryPolicy::unbounded(Duration::from_millis(500), Duration::from_secs(60)),
            worker: WorkerConfig::default(),
        }
    }
}

fn transaction_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::unbounded(Duration::from_millis(2), Duration::from_millis(200)).with_limit(max_attempts)
}

impl OrchestrationConfig {
    pub fn with_transaction_retry(mut self, policy: RetryPolicy) -> Self {
        self.transaction_retry = policy;
        self
    }

    pub fn with_queue_retry(mut self, policy: RetryPolicy) -> Self {
        self.queue_retry = policy;
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                    ConfigError::InvalidNumber {
                        key: key.to_string(),
                        value: raw,
                    }
                }),
            }
        };
        let attempts = |key: &str| -> Result<Option<u32>, ConfigError> {
            match number(key)? {
                None => Ok(None),
                Some(n) => u32::try_from(n).map(Some).map_err(|_| ConfigError::InvalidNumber {
                    key: key.to_string(),
                    value: n.to_string(),
                }),
            }
        };

        let mut config = Self::default();

        if let Some(n) = attempts("LIGHT_TXN_MAX_ATTEMPTS")? {
            config.transaction_retry = transaction_policy(n);
        }
        if let Some(n) = attempts("LIGHT_QUEUE_MAX_ATTEMPTS")? {
            config.queue_retry = config.queue_retry.with_limit(n);
        }
        if let Some(ms) = number("LIGHT_QUEUE_BASE_DELAY_MS")? {
            config.queue_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = number("LIGHT_WORKER_POLL_MS")? {
            config.worker.poll_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
