use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CacheError;

/// Storage backend, chosen once when the cache is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    File { path: PathBuf },
}

impl Default for CacheBackend {
    fn default() -> Self {
        CacheBackend::Memory
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub max_entries: usize,
    pub write_ttl_ms: u64,
    pub access_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_entries: 10_000,
            write_ttl_ms: 24 * 60 * 60 * 1000,
            access_ttl_ms: 2 * 60 * 60 * 1000,
        }
    }
}

impl CacheConfig {
    pub fn write_ttl(&self) -> Duration {
        Duration::from_millis(self.write_ttl_ms)
    }

    pub fn access_ttl(&self) -> Duration {
        Duration::from_millis(self.access_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be > 0".to_string(),
            ));
        }
        if self.write_ttl_ms == 0 || self.access_ttl_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "write_ttl_ms and access_ttl_ms must be > 0".to_string(),
            ));
        }
        if let CacheBackend::File { path } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(CacheError::InvalidConfig(
                    "file backend requires a path".to_string(),
                ));
            }
        }
        Ok(())
    }
}
