//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::pipeline::retry::RetryPolicy;
use crate::{AppError, Result};

/// Environment variable that overrides `pipeline.simulate_failure`.
pub const SIMULATE_FAILURE_ENV: &str = "CATALOG_INTAKE_SIMULATE_FAILURE";

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// `SQLite` file at `database_path`.
    #[default]
    Sqlite,
    /// Process-local maps; contents are lost on exit.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Which backend holds inquiries and catalog records.
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Job pipeline tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Maximum number of jobs executing concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempts allowed per unit of work, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before a failed unit is re-enqueued.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Deterministically fail the first tenth of every dispatched inquiry.
    #[serde(default)]
    pub simulate_failure: bool,
    /// Re-dispatch inquiries left `ACTIVE` by a previous run.
    #[serde(default = "default_true")]
    pub recover_on_startup: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            simulate_failure: false,
            recover_on_startup: true,
        }
    }
}

/// Limits applied by the submission layer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct IntakeConfig {
    /// Largest batch accepted in one submission.
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_batch_items: default_max_batch_items(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    8
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_max_batch_items() -> usize {
    2000
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("catalog.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the intake API; 0 picks an ephemeral port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Location of the `SQLite` database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Storage backend selection.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Submission limits.
    #[serde(default)]
    pub intake: IntakeConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Unrecognised values are ignored with a warning so a typo never
    /// silently enables failure injection.
    pub fn apply_env_overrides(&mut self) {
        let Ok(raw) = env::var(SIMULATE_FAILURE_ENV) else {
            return;
        };
        match parse_flag(&raw) {
            Some(flag) => self.pipeline.simulate_failure = flag,
            None => warn!(
                var = SIMULATE_FAILURE_ENV,
                value = %raw,
                "ignoring unrecognised boolean override"
            ),
        }
    }

    /// Retry policy handed to every dispatched unit.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.pipeline.max_attempts,
            Duration::from_millis(self.pipeline.retry_backoff_ms),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            return Err(AppError::Config(
                "pipeline.workers must be greater than zero".into(),
            ));
        }

        if self.pipeline.max_attempts == 0 {
            return Err(AppError::Config(
                "pipeline.max_attempts must be greater than zero".into(),
            ));
        }

        if self.intake.max_batch_items == 0 {
            return Err(AppError::Config(
                "intake.max_batch_items must be greater than zero".into(),
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.database_path.as_os_str().is_empty()
        {
            return Err(AppError::Config(
                "database_path must not be empty for the sqlite backend".into(),
            ));
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
