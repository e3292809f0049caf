//! Runtime-tunable settings of the polling loops.

use crate::processors::batch_runner::DEFAULT_RETRY_BATCH_SIZE;
use std::time::Duration;

/// Settings read by the batch runner and dead-letter mover on every
/// pass. Held in a [`ConfigStore`](crate::config::ConfigStore) so a
/// reload takes effect without restarting the loops.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Cadence of the pending/retry delivery pass.
    pub poll_interval: Duration,
    /// Cadence of the dead-letter pass.
    pub dead_letter_interval: Duration,
    /// Batch size of the pending pass.
    pub batch_size: usize,
    /// Batch size of the retry pass.
    pub retry_batch_size: usize,
    /// Retry ceiling shared by the retry pass and the dead-letter mover:
    /// below it a failed log is retried, at it the log is quarantined.
    pub max_retries: i32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            dead_letter_interval: Duration::from_secs(60),
            batch_size: 50,
            retry_batch_size: DEFAULT_RETRY_BATCH_SIZE,
            max_retries: 5,
        }
    }
}
