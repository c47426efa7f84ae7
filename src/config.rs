use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::buffer::DEFAULT_BUFFER_PAGES;
use crate::file::DEFAULT_PAGE_SIZE;
use crate::record::Type;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine settings. Missing keys in a config file take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bytes per page, fixed for the lifetime of an instance
    pub page_size: usize,
    /// Number of pages the buffer pool can hold
    pub buffer_pages: usize,
    /// How long a lock request waits before its transaction is aborted
    pub lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pages: DEFAULT_BUFFER_PAGES,
            lock_timeout_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffer_pages == 0 {
            return Err(ConfigError::Invalid("buffer_pages must be at least 1".to_string()));
        }
        // The smallest record is a single int plus its header bit
        let min_page = Type::Int.size() + 1;
        if self.page_size < min_page {
            return Err(ConfigError::Invalid(format!(
                "page_size {} cannot hold a single record",
                self.page_size
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
