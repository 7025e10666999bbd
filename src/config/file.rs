// src/config/file.rs
// File-based configuration from ~/.tagstore/config.toml

use crate::db::PoolOptions;
use crate::search::MatchMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TagStoreConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// `[storage]` section
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; defaults to ~/.tagstore/tags.db
    pub path: Option<PathBuf>,
    pub pool_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// `[search]` section
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_mode: MatchMode,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: MatchMode::All,
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl SearchConfig {
    /// Cap a requested page size at `max_limit`. Zero stays zero.
    pub fn clamp_limit(&self, requested: usize) -> usize {
        requested.min(self.max_limit)
    }
}

impl TagStoreConfig {
    /// Load config from ~/.tagstore/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_dir().join("config.toml"))
    }

    /// Load config from an explicit file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// ~/.tagstore
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tagstore")
    }

    /// Database path: configured, else ~/.tagstore/tags.db
    pub fn db_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("tags.db"))
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.storage.pool_size.max(1),
            busy_timeout: Duration::from_millis(self.storage.busy_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[storage]
path = "/tmp/tags.db"
pool_size = 4

[search]
default_mode = "any"
max_limit = 25
"#;
        let config: TagStoreConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/tags.db"));
        assert_eq!(config.storage.pool_size, 4);
        assert_eq!(config.storage.busy_timeout_ms, 5000);
        assert_eq!(config.search.default_mode, MatchMode::Any);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.max_limit, 25);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: TagStoreConfig = toml::from_str("").unwrap();
        assert_eq!(config, TagStoreConfig::default());
    }

    #[test]
    fn test_load_from_bad_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\npool_size = ").unwrap();
        assert_eq!(TagStoreConfig::load_from(&path), TagStoreConfig::default());
        assert_eq!(
            TagStoreConfig::load_from(&dir.path().join("missing.toml")),
            TagStoreConfig::default()
        );
    }

    #[test]
    fn test_clamp_limit() {
        let search = SearchConfig::default();
        assert_eq!(search.clamp_limit(0), 0);
        assert_eq!(search.clamp_limit(1), 1);
        assert_eq!(search.clamp_limit(10), 10);
        assert_eq!(search.clamp_limit(500), 50);
    }

    #[test]
    fn test_pool_options() {
        let mut config = TagStoreConfig::default();
        config.storage.pool_size = 0;
        config.storage.busy_timeout_ms = 250;
        let opts = config.pool_options();
        assert_eq!(opts.max_size, 1);
        assert_eq!(opts.busy_timeout, Duration::from_millis(250));
    }
}
