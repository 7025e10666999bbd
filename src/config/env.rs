// src/config/env.rs
// Environment overrides layered over the file config

use super::file::TagStoreConfig;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// Environment overrides (TAGSTORE_DB, TAGSTORE_POOL_SIZE, TAGSTORE_BUSY_TIMEOUT_MS)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub db_path: Option<PathBuf>,
    pub pool_size: Option<usize>,
    pub busy_timeout_ms: Option<u64>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source, so tests need not touch the process env
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            db_path: read("TAGSTORE_DB").map(PathBuf::from),
            pool_size: read("TAGSTORE_POOL_SIZE").and_then(|v| parse_var("TAGSTORE_POOL_SIZE", &v)),
            busy_timeout_ms: read("TAGSTORE_BUSY_TIMEOUT_MS")
                .and_then(|v| parse_var("TAGSTORE_BUSY_TIMEOUT_MS", &v)),
        }
    }

    pub fn apply(&self, config: &mut TagStoreConfig) {
        if let Some(path) = &self.db_path {
            debug!(path = %path.display(), "Database path overridden by TAGSTORE_DB");
            config.storage.path = Some(path.clone());
        }
        if let Some(size) = self.pool_size {
            config.storage.pool_size = size;
        }
        if let Some(ms) = self.busy_timeout_ms {
            config.storage.busy_timeout_ms = ms;
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value, "Ignoring unparsable environment override");
            None
        }
    }
}
