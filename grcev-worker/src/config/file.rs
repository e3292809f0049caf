//! TOML file configuration structures.
//!
//! These structs directly map to the `grcev-config.toml` file format.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub webhook: WebhookSection,
}

/// Worker section: polling cadence and batch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Seconds between pending/retry delivery passes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds between dead-letter passes.
    #[serde(default = "default_dead_letter_interval_secs")]
    pub dead_letter_interval_secs: u64,
    /// Logs taken per pending pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Logs taken per retry pass.
    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: usize,
    /// Retry ceiling for the retry pass and dead-letter mover.
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
}

/// Webhook section: HTTP client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSection {
    /// Per-call timeout for webhook POSTs, in seconds.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    /// Shared secret used to sign webhook bodies; unset disables signing.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_dead_letter_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    50
}

fn default_retry_batch_size() -> usize {
    grcev_core::processors::DEFAULT_RETRY_BATCH_SIZE
}

fn default_max_retries() -> i32 {
    5
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            dead_letter_interval_secs: default_dead_letter_interval_secs(),
            batch_size: default_batch_size(),
            retry_batch_size: default_retry_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
            signing_secret: None,
        }
    }
}
