//! File-persisted store: the memory store plus a JSON write-through snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::entry::{CachedSelector, PersistedSelector};
use crate::errors::CacheError;
use crate::key::CacheKey;
use crate::memory::MemorySelectorCache;
use crate::metrics::CacheMetricsSnapshot;
use crate::SelectorCache;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedCache {
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<CacheKey, PersistedSelector>,
}

pub struct FileSelectorCache {
    memory: MemorySelectorCache,
    path: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FileSelectorCache {
    /// Opens (or creates on first write) the cache file at `path`.
    ///
    /// Entries older than the write TTL are dropped while loading.
    pub async fn open(path: impl Into<PathBuf>, config: &CacheConfig) -> Result<Self, CacheError> {
        let path = path.into();
        let memory = MemorySelectorCache::new(config);

        match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => {}
            Ok(content) => {
                let persisted: PersistedCache = serde_json::from_str(&content)?;
                if persisted.version != FORMAT_VERSION {
                    return Err(CacheError::UnsupportedVersion(persisted.version));
                }
                let now = Utc::now();
                let write_ttl = config.write_ttl();
                let mut restored = 0usize;
                let mut stale = 0usize;
                for (key, record) in persisted.entries {
                    let age = (now - record.created_at).to_std().unwrap_or_default();
                    if age >= write_ttl {
                        stale += 1;
                        continue;
                    }
                    memory.insert_aged(key, Arc::new(CachedSelector::from_record(record)), age);
                    restored += 1;
                }
                info!(path = %path.display(), restored, stale, "loaded selector cache");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "selector cache file not found; starting empty");
            }
            Err(err) => return Err(CacheError::io(&path, err)),
        }

        Ok(Self {
            memory,
            path,
            write_lock: AsyncMutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a cache file without opening a store, for inspection tooling.
    pub async fn read_snapshot(path: &Path) -> Result<PersistedCache, CacheError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|err| CacheError::io(path, err))?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn persist(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let snapshot = PersistedCache {
            version: FORMAT_VERSION,
            entries: self
                .memory
                .live_entries()
                .into_iter()
                .map(|(key, entry)| (key, entry.to_record()))
                .collect(),
        };
        let payload = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| CacheError::io(parent, err))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)
            .await
            .map_err(|err| CacheError::io(&tmp, err))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| CacheError::io(&self.path, err))?;
        Ok(())
    }

    async fn persist_logged(&self) -> Result<(), CacheError> {
        self.persist().await.map_err(|err| {
            self.memory.stats().record_error();
            warn!(path = %self.path.display(), error = %err, "failed to persist selector cache");
            err
        })
    }
}

#[async_trait]
impl SelectorCache for FileSelectorCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CachedSelector>>, CacheError> {
        Ok(self.memory.lookup(key))
    }

    async fn put(&self, key: CacheKey, entry: CachedSelector) -> Result<(), CacheError> {
        self.memory.put(key, entry).await?;
        self.persist_logged().await
    }

    async fn record_outcome(&self, key: &CacheKey, success: bool) -> Result<(), CacheError> {
        if self.memory.record(key, success) {
            self.persist_logged().await?;
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let removed = self.memory.pop(key);
        if removed {
            self.persist_logged().await?;
        }
        Ok(removed)
    }

    async fn evict_expired(&self) -> Result<usize, CacheError> {
        let swept = self.memory.sweep();
        if swept > 0 {
            self.persist_logged().await?;
        }
        Ok(swept)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.memory.purge();
        self.persist_logged().await
    }

    fn size(&self) -> usize {
        self.memory.len()
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        self.memory.metrics()
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
