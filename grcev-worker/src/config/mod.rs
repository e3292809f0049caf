//! Configuration module for grcev-worker.
//!
//! Handles loading configuration from the TOML file and environment,
//! with validation, and converts it into the runtime types the engine
//! consumes.

pub mod file;

use crate::config::file::{FileConfig, WebhookSection, WorkerSection};
use grcev_core::config::RunnerConfig;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub worker: WorkerSection,
    pub webhook: WebhookSection,
}

impl LoadedConfig {
    /// Runtime settings for the polling loops.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_secs(self.worker.poll_interval_secs),
            dead_letter_interval: Duration::from_secs(self.worker.dead_letter_interval_secs),
            batch_size: self.worker.batch_size,
            retry_batch_size: self.worker.retry_batch_size,
            max_retries: self.worker.max_retries,
        }
    }

    /// Per-call webhook timeout.
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook.timeout_secs)
    }

    /// Signing key bytes, when webhook signing is enabled.
    pub fn signing_key(&self) -> Option<Box<[u8]>> {
        self.webhook
            .signing_secret
            .as_deref()
            .map(|secret| secret.as_bytes().to_vec().into_boxed_slice())
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    /// Load and validate the configuration.
    ///
    /// A missing file is not an error: every setting has a default, so
    /// the worker runs with defaults and logs what it did.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = if self.config_path.exists() {
            let config_content = std::fs::read_to_string(&self.config_path)?;
            toml::from_str::<FileConfig>(&config_content)?
        } else {
            tracing::warn!(
                path = %self.config_path.display(),
                "Config file not found, running with defaults"
            );
            FileConfig::default()
        };

        self.validate(&file_config)?;

        Ok(LoadedConfig {
            worker: file_config.worker,
            webhook: file_config.webhook,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.worker.batch_size == 0 || config.worker.retry_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch sizes must be greater than zero".to_owned(),
            ));
        }
        if config.worker.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_secs must be greater than zero".to_owned(),
            ));
        }
        if config.worker.max_retries < 0 {
            return Err(ConfigError::ValidationError(
                "max_retries must not be negative".to_owned(),
            ));
        }
        if config.webhook.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "webhook timeout_secs must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::new("/nonexistent/grcev-config.toml");
        let loaded = loader.load().unwrap();
        assert_eq!(loaded.worker.batch_size, 50);
        assert_eq!(loaded.webhook.timeout_secs, 30);
        assert!(loaded.signing_key().is_none());
    }

    #[test]
    fn runner_config_converts_seconds_to_durations() {
        let loaded = LoadedConfig {
            worker: WorkerSection {
                poll_interval_secs: 7,
                dead_letter_interval_secs: 90,
                batch_size: 10,
                retry_batch_size: 20,
                max_retries: 3,
            },
            webhook: WebhookSection::default(),
        };
        let runner = loaded.runner_config();
        assert_eq!(runner.poll_interval, Duration::from_secs(7));
        assert_eq!(runner.dead_letter_interval, Duration::from_secs(90));
        assert_eq!(runner.batch_size, 10);
        assert_eq!(runner.retry_batch_size, 20);
        assert_eq!(runner.max_retries, 3);
    }
}
