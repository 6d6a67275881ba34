//! In-process LRU store with independent write and access expiry.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::entry::CachedSelector;
use crate::errors::CacheError;
use crate::key::CacheKey;
use crate::metrics::{CacheMetricsSnapshot, CacheStats};
use crate::SelectorCache;

struct Slot {
    entry: Arc<CachedSelector>,
    written_at: Instant,
    accessed_at: Instant,
}

pub struct MemorySelectorCache {
    inner: Mutex<LruCache<CacheKey, Slot>>,
    write_ttl: Duration,
    access_ttl: Duration,
    stats: CacheStats,
}

impl MemorySelectorCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            write_ttl: config.write_ttl(),
            access_ttl: config.access_ttl(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.written_at) >= self.write_ttl
            || now.saturating_duration_since(slot.accessed_at) >= self.access_ttl
    }

    pub(crate) fn lookup(&self, key: &CacheKey) -> Option<Arc<CachedSelector>> {
        let now = Instant::now();
        let mut guard = self.inner.lock();

        let expired = match guard.peek(key) {
            Some(slot) => self.is_expired(slot, now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };
        if expired {
            guard.pop(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            debug!(key = %key, "cache entry expired on read");
            return None;
        }

        let slot = guard.get_mut(key)?;
        slot.accessed_at = now;
        self.stats.record_hit();
        Some(Arc::clone(&slot.entry))
    }

    /// Inserts with an explicit write age, used when restoring persisted
    /// entries so their write TTL keeps counting from the original write.
    pub(crate) fn insert_aged(&self, key: CacheKey, entry: Arc<CachedSelector>, age: Duration) {
        let now = Instant::now();
        let written_at = now.checked_sub(age).unwrap_or(now);
        let slot = Slot {
            entry,
            written_at,
            accessed_at: now,
        };
        let mut guard = self.inner.lock();
        if let Some((evicted, _)) = guard.push(key.clone(), slot) {
            if evicted != key {
                self.stats.record_eviction();
                debug!(key = %evicted, "cache entry evicted (capacity)");
            }
        }
        self.stats.record_load();
    }

    pub(crate) fn record(&self, key: &CacheKey, success: bool) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        match guard.get_mut(key) {
            Some(slot) => {
                slot.accessed_at = now;
                slot.entry.record(success);
                true
            }
            None => false,
        }
    }

    pub(crate) fn pop(&self, key: &CacheKey) -> bool {
        let removed = self.inner.lock().pop(key).is_some();
        if removed {
            self.stats.record_removals(1);
        }
        removed
    }

    pub(crate) fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let expired: Vec<CacheKey> = guard
            .iter()
            .filter(|(_, slot)| self.is_expired(slot, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        if !expired.is_empty() {
            self.stats.record_expirations(expired.len() as u64);
        }
        expired.len()
    }

    pub(crate) fn purge(&self) -> usize {
        let mut guard = self.inner.lock();
        let count = guard.len();
        guard.clear();
        self.stats.record_removals(count as u64);
        count
    }

    /// Live (non-expired) entries, most recently used first.
    pub(crate) fn live_entries(&self) -> Vec<(CacheKey, Arc<CachedSelector>)> {
        let now = Instant::now();
        self.inner
            .lock()
            .iter()
            .filter(|(_, slot)| !self.is_expired(slot, now))
            .map(|(key, slot)| (key.clone(), Arc::clone(&slot.entry)))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

#[async_trait]
impl SelectorCache for MemorySelectorCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<CachedSelector>>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn put(&self, key: CacheKey, entry: CachedSelector) -> Result<(), CacheError> {
        self.insert_aged(key, Arc::new(entry), Duration::ZERO);
        Ok(())
    }

    async fn record_outcome(&self, key: &CacheKey, success: bool) -> Result<(), CacheError> {
        if !self.record(key, success) {
            debug!(key = %key, success, "outcome for absent cache entry ignored");
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.pop(key))
    }

    async fn evict_expired(&self) -> Result<usize, CacheError> {
        Ok(self.sweep())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.purge();
        Ok(())
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn metrics(&self) -> CacheMetricsSnapshot {
        self.stats.snapshot(self.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
