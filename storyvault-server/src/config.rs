//! Server configuration (TOML)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use storyvault_core::VaultConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub vault: VaultConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_size() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_size: default_max_body_size(),
            debug: false,
            vault: VaultConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyvault_core::ContentType;

    #[test]
    fn test_parse_partial_config() {
        let config = ServerConfig::from_toml(
            r#"
listen_addr = "127.0.0.1:9000"

[vault]
database_path = "/var/lib/storyvault/vault.sqlite"
default_content_type = "html"
"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.max_body_size, default_max_body_size());
        assert_eq!(config.vault.default_content_type, ContentType::Html);
        assert_eq!(config.vault.read_retries, 1);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(!config.debug);
    }

    #[test]
    fn test_written_config_reads_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("storyvault.toml");
        let mut config = ServerConfig::default();
        config.vault.writer_idle_timeout_ms = 500;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = ServerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.vault.writer_idle_timeout_ms, 500);
    }
}
