//! Content engine configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::revision::ContentType;

/// Tunables for the content engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Idle time after which a project's writer task retires
    #[serde(default = "default_writer_idle_timeout_ms")]
    pub writer_idle_timeout_ms: u64,

    /// Extra attempts for reads that fail with a transient store error
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Encoding given to revisions created without an explicit one
    #[serde(default)]
    pub default_content_type: ContentType,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/storyvault.sqlite")
}

fn default_writer_idle_timeout_ms() -> u64 {
    30_000
}

fn default_read_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            writer_idle_timeout_ms: default_writer_idle_timeout_ms(),
            read_retries: default_read_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_content_type: ContentType::default(),
        }
    }
}

impl VaultConfig {
    pub fn writer_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.writer_idle_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Load configuration from a JSON file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read vault config from {:?}", path))?;
        let config: VaultConfig =
            serde_json::from_str(&data).with_context(|| "Failed to parse vault config JSON")?;
        Ok(config)
    }

    /// Save configuration as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
