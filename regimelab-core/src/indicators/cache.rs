//! Bounded in-memory memo for indicator outputs.
//!
//! Entries are keyed by a BLAKE3 digest of the series content and the
//! indicator kind (type tag plus every parameter). A miss computes fresh, so
//! the cache can be dropped or resized without changing any result.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::domain::BarSeries;
use crate::indicators::{IndicatorError, IndicatorKind, IndicatorOutputs, IndicatorRegistry};

/// Hit/miss counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Least-recently-used indicator cache, shareable across threads.
pub struct IndicatorCache {
    /// `None` when the cache was built with zero capacity.
    entries: Option<Mutex<LruCache<String, Arc<IndicatorOutputs>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl fmt::Debug for IndicatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorCache")
            .field("capacity", &self.capacity())
            .field("stats", &self.stats())
            .finish()
    }
}

impl IndicatorCache {
    /// Cache holding at most `capacity` outputs. Zero disables storage.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.with_entries(|lru| lru.cap().get()).unwrap_or(0)
    }

    /// Cache key for `kind` computed over the whole of `series`.
    ///
    /// The kind is hashed through its tagged serde form, so a custom
    /// indicator never shares a key with a built-in of the same name.
    /// Custom kinds also hash the identity of the implementation `registry`
    /// holds for them; the cache must not outlive the registries it serves.
    pub fn key(registry: &IndicatorRegistry, series: &BarSeries, kind: &IndicatorKind) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(series.content_hash(0, series.len()).as_bytes());
        hasher.update(b"\x1f");
        match serde_json::to_vec(kind) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{kind:?}").as_bytes()),
        };
        if let IndicatorKind::Custom { name, .. } = kind {
            hasher.update(b"\x1f");
            let identity = registry.custom_identity(name).unwrap_or(0);
            hasher.update(&identity.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn get_or_compute(
        &self,
        registry: &IndicatorRegistry,
        series: &BarSeries,
        kind: &IndicatorKind,
    ) -> Result<Arc<IndicatorOutputs>, IndicatorError> {
        let key = Self::key(registry, series, kind);

        if let Some(outputs) = self.with_entries(|lru| lru.get(&key).cloned()).flatten() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(outputs);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Computed outside the lock; a concurrent duplicate miss just recomputes.
        let outputs = Arc::new(registry.compute_kind(series.bars(), kind)?);
        self.with_entries(|lru| lru.put(key, Arc::clone(&outputs)));
        Ok(outputs)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.with_entries(|lru| lru.len()).unwrap_or(0),
        }
    }

    pub fn clear(&self) {
        self.with_entries(|lru| lru.clear());
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut LruCache<String, Arc<IndicatorOutputs>>) -> T,
    ) -> Option<T> {
        let entries = self.entries.as_ref()?;
        let mut guard = entries.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&mut guard))
    }
}

impl Default for IndicatorCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::indicators::{make_bars, CustomIndicator};
    use std::collections::BTreeMap;

    fn series(closes: &[f64]) -> BarSeries {
        BarSeries::new("TEST", "1d", make_bars(closes)).unwrap()
    }

    #[test]
    fn second_lookup_hits() {
        let cache = IndicatorCache::new(8);
        let registry = IndicatorRegistry::new();
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let kind = IndicatorKind::Sma { period: 2 };

        let first = cache.get_or_compute(&registry, &s, &kind).unwrap();
        let second = cache.get_or_compute(&registry, &s, &kind).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn hit_equals_fresh_computation() {
        let cache = IndicatorCache::new(8);
        let registry = IndicatorRegistry::new();
        let s = series(&[10.0, 11.0, 9.0, 12.0, 13.0, 12.5]);
        let kind = IndicatorKind::Rsi { period: 3 };

        cache.get_or_compute(&registry, &s, &kind).unwrap();
        let cached = cache.get_or_compute(&registry, &s, &kind).unwrap();
        let fresh = registry.compute_kind(s.bars(), &kind).unwrap();
        assert_same_outputs(&cached, &fresh);
    }

    /// Field-by-field comparison where NaN matches NaN.
    fn assert_same_outputs(a: &IndicatorOutputs, b: &IndicatorOutputs) {
        assert_eq!(a.warmup(), b.warmup());
        assert_eq!(a.primary_name(), b.primary_name());
        assert_eq!(a.fields().collect::<Vec<_>>(), b.fields().collect::<Vec<_>>());
        for field in a.fields() {
            let (x, y) = (a.get(field).unwrap(), b.get(field).unwrap());
            assert_eq!(x.len(), y.len(), "{field}");
            for (i, (p, q)) in x.iter().zip(y).enumerate() {
                assert_eq!(p.to_bits(), q.to_bits(), "{field}[{i}]: {p} vs {q}");
            }
        }
    }

    struct Constant(f64);

    impl CustomIndicator for Constant {
        fn warmup(&self, _params: &BTreeMap<String, f64>) -> usize {
            0
        }

        fn compute(&self, bars: &[Bar], _params: &BTreeMap<String, f64>) -> Vec<f64> {
            vec![self.0; bars.len()]
        }
    }

    #[test]
    fn custom_named_like_a_builtin_gets_its_own_entry() {
        let cache = IndicatorCache::new(8);
        let registry = IndicatorRegistry::new().with_custom("sma", Arc::new(Constant(42.0)));
        let s = series(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let builtin = IndicatorKind::Sma { period: 3 };
        let custom = IndicatorKind::Custom {
            name: "sma".into(),
            params: BTreeMap::from([("period".to_string(), 3.0)]),
        };
        assert_eq!(builtin.to_string(), custom.to_string());
        assert_ne!(
            IndicatorCache::key(&registry, &s, &builtin),
            IndicatorCache::key(&registry, &s, &custom)
        );

        let b = cache.get_or_compute(&registry, &s, &builtin).unwrap();
        let c = cache.get_or_compute(&registry, &s, &custom).unwrap();
        assert!(b.primary()[0].is_nan());
        assert_eq!(c.primary(), &[42.0; 5]);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn custom_entries_follow_the_registered_implementation() {
        let cache = IndicatorCache::new(8);
        let s = series(&[1.0, 2.0, 3.0]);
        let kind = IndicatorKind::Custom {
            name: "level".into(),
            params: BTreeMap::new(),
        };
        let low = IndicatorRegistry::new().with_custom("level", Arc::new(Constant(1.0)));
        let high = IndicatorRegistry::new().with_custom("level", Arc::new(Constant(9.0)));

        assert_eq!(cache.get_or_compute(&low, &s, &kind).unwrap().primary(), &[1.0; 3]);
        assert_eq!(cache.get_or_compute(&high, &s, &kind).unwrap().primary(), &[9.0; 3]);
        // a clone shares the implementation, so it shares the entry
        let shared = low.clone();
        cache.get_or_compute(&shared, &s, &kind).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn distinct_params_get_distinct_entries() {
        let cache = IndicatorCache::new(8);
        let registry = IndicatorRegistry::new();
        let s = series(&[1.0, 2.0, 3.0, 4.0]);

        cache
            .get_or_compute(&registry, &s, &IndicatorKind::Sma { period: 2 })
            .unwrap();
        cache
            .get_or_compute(&registry, &s, &IndicatorKind::Sma { period: 3 })
            .unwrap();
        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = IndicatorCache::new(2);
        let registry = IndicatorRegistry::new();
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let a = IndicatorKind::Sma { period: 1 };
        let b = IndicatorKind::Sma { period: 2 };
        let c = IndicatorKind::Sma { period: 3 };

        cache.get_or_compute(&registry, &s, &a).unwrap();
        cache.get_or_compute(&registry, &s, &b).unwrap();
        cache.get_or_compute(&registry, &s, &a).unwrap(); // a is now fresher than b
        cache.get_or_compute(&registry, &s, &c).unwrap(); // evicts b

        let before = cache.stats();
        cache.get_or_compute(&registry, &s, &a).unwrap();
        assert_eq!(cache.stats().hits, before.hits + 1);
        cache.get_or_compute(&registry, &s, &b).unwrap();
        assert_eq!(cache.stats().misses, before.misses + 1);
    }

    #[test]
    fn zero_capacity_never_stores() {
        let cache = IndicatorCache::new(0);
        let registry = IndicatorRegistry::new();
        let s = series(&[1.0, 2.0]);
        let kind = IndicatorKind::Obv;
        cache.get_or_compute(&registry, &s, &kind).unwrap();
        cache.get_or_compute(&registry, &s, &kind).unwrap();
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().entries, 0);
    }
}
