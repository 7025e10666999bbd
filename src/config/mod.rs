// src/config/mod.rs
// Configuration: file defaults plus environment overrides

pub mod env;
pub mod file;

pub use env::EnvOverrides;
pub use file::{SearchConfig, StorageConfig, TagStoreConfig};

use crate::error::{Result, TagError};

impl TagStoreConfig {
    /// File config with environment overrides applied
    pub fn load_with_env() -> Self {
        let mut config = Self::load();
        EnvOverrides::from_env().apply(&mut config);
        config
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.search.max_limit == 0 {
            return Err(TagError::Config("search.max_limit must be at least 1".into()));
        }
        if self.search.default_limit > self.search.max_limit {
            return Err(TagError::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.search.default_limit, self.search.max_limit
            )));
        }
        Ok(())
    }
}
