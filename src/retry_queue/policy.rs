//! Exponential backoff for queued redeliveries.

use crate::config::DeliverySettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before a job fails permanently.
    pub max_retries: i32,
    /// Backoff before the first retry, in seconds.
    pub base_backoff_secs: u64,
    /// Cap for the exponential growth, in seconds.
    pub max_backoff_secs: u64,
}

impl RetryPolicy {
    pub fn new(config: &DeliverySettings) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff_secs: config.retry_base_backoff_secs,
            max_backoff_secs: config.retry_max_backoff_secs,
        }
    }

    /// Backoff for a given retry count: `base * 2^retry_count`, capped.
    pub fn backoff_secs(&self, retry_count: i32) -> u64 {
        let backoff = (self.base_backoff_secs as f64) * 2f64.powi(retry_count.max(0));
        backoff.min(self.max_backoff_secs as f64) as u64
    }

    /// Unix timestamp of the next attempt for a job at `retry_count`.
    pub fn next_retry_at(&self, retry_count: i32) -> i64 {
        chrono::Utc::now().timestamp() + self.backoff_secs(retry_count) as i64
    }

    pub fn should_retry(&self, retry_count: i32) -> bool {
        retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_secs: 5,
            max_backoff_secs: 300,
        }
    }
}
