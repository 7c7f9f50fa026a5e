//! Queue configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::job::{JobOptions, DEFAULT_TIMEOUT_MS};
use crate::storage::sqlite::DEFAULT_STORAGE_KEY;

/// Settings for a [`Queue`](crate::Queue)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// SQLite connection URL used by [`Queue::connect`](crate::Queue::connect)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Key the job list is stored under
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Safety margin subtracted from the remaining lifespan before selecting jobs
    #[serde(default = "default_lifespan_buffer_ms")]
    pub lifespan_buffer_ms: u64,

    /// Timeout given to jobs created with [`QueueConfig::job_options`]
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_database_url() -> String {
    "sqlite://jobs.db?mode=rwc".to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_lifespan_buffer_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            storage_key: default_storage_key(),
            lifespan_buffer_ms: default_lifespan_buffer_ms(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl QueueConfig {
    /// Load from `JOBQUEUE_*` environment variables, e.g. `JOBQUEUE_DATABASE_URL`
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("JOBQUEUE").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a file, with environment variables taking precedence
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("JOBQUEUE").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn lifespan_buffer(&self) -> Duration {
        Duration::from_millis(self.lifespan_buffer_ms)
    }

    /// Job options carrying this configuration's default timeout
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            timeout: self.default_timeout_ms,
            ..JobOptions::default()
        }
    }
}
