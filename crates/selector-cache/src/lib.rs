//! Selector cache for the AutoHeal resolution engine.
//!
//! Maps a deterministic contextual key to a previously successful selector and
//! its rolling trust statistics. Bounded by entry count (LRU) and by two
//! independent expirations, time since write and time since last access.
//!
//! Two interchangeable backends are provided: [`MemorySelectorCache`] and the
//! JSON-persisted [`FileSelectorCache`]. [`open_cache`] picks one from
//! [`CacheConfig`] once; callers only ever see `Arc<dyn SelectorCache>`.

pub mod config;
pub mod entry;
pub mod errors;
pub mod file;
pub mod key;
pub mod memory;
pub mod metrics;

pub use config::{CacheBackend, CacheConfig};
pub use entry::{CachedSelector, PersistedSelector};
pub use errors::CacheError;
pub use file::{FileSelectorCache, PersistedCache};
pub use key::{build_key, CacheKey};
pub use memory::MemorySelectorCache;
pub use metrics::{CacheMetricsSnapshot, CacheStats};

use std::sync::Arc;

use async_trait::async_trait;

/// Default success rate an entry must strictly exceed to be reused.
pub const DEFAULT_TRUST_THRESHOLD: f64 = 0.7;

#[async_trait]
pub trait SelectorCache: Send + Sync {
    /// Live entry for `key`. Expired entries are retired here and reported as
    /// a miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CachedSelector>>, CacheError>;

    /// Inserts or replaces the entry for `key`.
    async fn put(&self, key: CacheKey, entry: CachedSelector) -> Result<(), CacheError>;

    /// Bumps the entry's counters in place. Absent keys are ignored.
    async fn record_outcome(&self, key: &CacheKey, success: bool) -> Result<(), CacheError>;

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Retires every expired entry, returning how many were dropped.
    async fn evict_expired(&self) -> Result<usize, CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    fn size(&self) -> usize;

    fn metrics(&self) -> CacheMetricsSnapshot;

    fn backend_name(&self) -> &'static str;
}

/// Builds the configured backend.
pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn SelectorCache>, CacheError> {
    config.validate()?;
    let cache: Arc<dyn SelectorCache> = match &config.backend {
        CacheBackend::Memory => Arc::new(MemorySelectorCache::new(config)),
        CacheBackend::File { path } => Arc::new(FileSelectorCache::open(path, config).await?),
    };
    tracing::debug!(backend = cache.backend_name(), "selector cache opened");
    Ok(cache)
}
