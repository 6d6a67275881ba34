use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use autoheal_core_types::ElementFingerprint;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A selector that previously resolved successfully, with rolling trust.
///
/// Counters are atomics so concurrent resolutions racing on one key update a
/// live aggregate. `attempts` is always bumped before `successes`, which keeps
/// `successes <= attempts` visible to every reader.
#[derive(Debug)]
pub struct CachedSelector {
    selector: String,
    fingerprint: Option<ElementFingerprint>,
    created_at: DateTime<Utc>,
    last_used_ms: AtomicI64,
    attempts: AtomicU32,
    successes: AtomicU32,
}

impl CachedSelector {
    /// New entries exist only after a verified success: 1 of 1.
    pub fn new(selector: impl Into<String>, fingerprint: Option<ElementFingerprint>) -> Self {
        let now = Utc::now();
        Self {
            selector: selector.into(),
            fingerprint,
            created_at: now,
            last_used_ms: AtomicI64::new(now.timestamp_millis()),
            attempts: AtomicU32::new(1),
            successes: AtomicU32::new(1),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn fingerprint(&self) -> Option<&ElementFingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        millis_to_datetime(self.last_used_ms.load(Ordering::Relaxed))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::Acquire)
    }

    /// `successes / attempts`, computed fresh on every call.
    pub fn success_rate(&self) -> f64 {
        let successes = self.successes();
        let attempts = self.attempts();
        if attempts == 0 {
            0.0
        } else {
            f64::from(successes) / f64::from(attempts)
        }
    }

    /// Strictly above `threshold`.
    pub fn is_trusted(&self, threshold: f64) -> bool {
        self.success_rate() > threshold
    }

    pub fn record(&self, success: bool) {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        if success {
            self.successes.fetch_add(1, Ordering::AcqRel);
        }
        self.last_used_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn to_record(&self) -> PersistedSelector {
        PersistedSelector {
            selector: self.selector.clone(),
            fingerprint: self.fingerprint.clone(),
            attempts: self.attempts(),
            successes: self.successes(),
            created_at: self.created_at,
            last_used: self.last_used(),
        }
    }

    /// Rebuilds an entry from its persisted form, repairing counters that
    /// would break `1 <= attempts` or `successes <= attempts`.
    pub fn from_record(record: PersistedSelector) -> Self {
        let attempts = record.attempts.max(1);
        let successes = record.successes.min(attempts);
        Self {
            selector: record.selector,
            fingerprint: record.fingerprint,
            created_at: record.created_at,
            last_used_ms: AtomicI64::new(record.last_used.timestamp_millis()),
            attempts: AtomicU32::new(attempts),
            successes: AtomicU32::new(successes),
        }
    }
}

/// On-disk layout of one cache entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSelector {
    pub selector: String,
    #[serde(default)]
    pub fingerprint: Option<ElementFingerprint>,
    pub attempts: u32,
    pub successes: u32,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn new_entry_starts_fully_trusted() {
        let entry = CachedSelector::new("#a", None);
        assert_eq!(entry.attempts(), 1);
        assert_eq!(entry.successes(), 1);
        assert_eq!(entry.success_rate(), 1.0);
        assert!(entry.is_trusted(0.7));
    }

    #[test]
    fn failures_decay_trust_below_threshold() {
        let entry = CachedSelector::new("#a", None);
        entry.record(false);
        // 1/2
        assert!(!entry.is_trusted(0.7));
        entry.record(true);
        entry.record(true);
        entry.record(true);
        // 4/5
        assert!(entry.is_trusted(0.7));
    }

    #[test]
    fn exact_threshold_is_not_trusted() {
        let entry = CachedSelector::new("#a", None);
        for _ in 0..6 {
            entry.record(true);
        }
        for _ in 0..3 {
            entry.record(false);
        }
        // 7 of 10
        assert_eq!(entry.success_rate(), 0.7);
        assert!(!entry.is_trusted(0.7));
    }

    #[test]
    fn concurrent_recording_is_lossless() {
        let entry = Arc::new(CachedSelector::new("#a", None));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let entry = Arc::clone(&entry);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        entry.record(i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(entry.attempts(), 8001);
        assert_eq!(entry.successes(), 4001);
        assert!(entry.successes() <= entry.attempts());
    }

    #[test]
    fn record_roundtrip_repairs_counters() {
        let entry = CachedSelector::new("button.ok", None);
        entry.record(false);
        let mut record = entry.to_record();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.successes, 1);

        record.attempts = 0;
        record.successes = 3;
        let restored = CachedSelector::from_record(record);
        assert_eq!(restored.attempts(), 1);
        assert_eq!(restored.successes(), 1);
        assert_eq!(restored.selector(), "button.ok");
    }
}
