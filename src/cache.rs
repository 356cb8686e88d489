//! Resolution cache
//!
//! Memoizes decoded records by index position, so repeated queries that
//! land on the same entry skip the redirect walk. Decoding is a pure
//! function of the buffer and the record offset, so two threads racing on
//! the same empty slot both compute the same value and either write wins.
//!
//! Two strategies are available:
//!
//! - **Slots**: one `OnceLock` per index entry. Unbounded but lock-free on
//!   hits; suits long-running services with skewed, wide query sets.
//! - **Lru**: a bounded `LruCache` behind a `Mutex`. Caps memory at the
//!   cost of a lock per lookup.

use crate::decoder::LocationRecord;
use crate::error::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Which cache strategy a database uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Decode on every lookup
    Disabled,
    /// One lazily-filled slot per index entry
    #[default]
    Slots,
    /// Bounded LRU with the given capacity
    Lru(usize),
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to decode
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Store {
    Disabled,
    Slots(Vec<OnceLock<LocationRecord>>),
    Lru(Mutex<LruCache<usize, LocationRecord>>),
}

/// Per-database cache of decoded records keyed by index position
pub struct ResolutionCache {
    store: Store,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    /// Create a cache for an index of `entry_count` entries
    pub fn new(mode: CacheMode, entry_count: usize) -> Self {
        let store = match mode {
            CacheMode::Disabled => Store::Disabled,
            CacheMode::Slots => Store::Slots((0..entry_count).map(|_| OnceLock::new()).collect()),
            CacheMode::Lru(capacity) => match NonZeroUsize::new(capacity) {
                Some(cap) => Store::Lru(Mutex::new(LruCache::new(cap))),
                None => Store::Disabled,
            },
        };
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached record for `position`, computing and storing it on a miss.
    ///
    /// Errors from `compute` are returned as-is and nothing is stored.
    pub fn get_or_compute<F>(&self, position: usize, compute: F) -> Result<LocationRecord>
    where
        F: FnOnce() -> Result<LocationRecord>,
    {
        match &self.store {
            Store::Disabled => compute(),
            Store::Slots(slots) => {
                let Some(slot) = slots.get(position) else {
                    return compute();
                };
                if let Some(record) = slot.get() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(record.clone());
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                let record = compute()?;
                // Losing a race leaves an identical value in place
                let _ = slot.set(record.clone());
                Ok(record)
            }
            Store::Lru(lru) => {
                if let Some(record) = lock(lru).get(&position) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(record.clone());
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                // Decode outside the lock
                let record = compute()?;
                lock(lru).put(position, record.clone());
                Ok(record)
            }
        }
    }

    /// Whether anything is cached at all
    pub fn is_enabled(&self) -> bool {
        !matches!(self.store, Store::Disabled)
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        match &self.store {
            Store::Disabled => 0,
            Store::Slots(slots) => slots.iter().filter(|s| s.get().is_some()).count(),
            Store::Lru(lru) => lock(lru).len(),
        }
    }

    /// Whether the cache currently holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached record and reset counters
    pub fn clear(&mut self) {
        match &mut self.store {
            Store::Disabled => {}
            Store::Slots(slots) => slots.iter_mut().for_each(|s| {
                s.take();
            }),
            Store::Lru(lru) => lock(lru).clear(),
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.store {
            Store::Disabled => "disabled",
            Store::Slots(_) => "slots",
            Store::Lru(_) => "lru",
        };
        f.debug_struct("ResolutionCache")
            .field("mode", &mode)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A poisoned lock only means another lookup panicked mid-insert; the
/// cached values themselves are always complete.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QqwryError;
    use std::cell::Cell;

    fn record(country: &str) -> LocationRecord {
        LocationRecord {
            country: country.as_bytes().to_vec(),
            area: Vec::new(),
        }
    }

    #[test]
    fn test_slots_compute_once() {
        let cache = ResolutionCache::new(CacheMode::Slots, 4);
        let calls = Cell::new(0);
        for _ in 0..3 {
            let r = cache
                .get_or_compute(2, || {
                    calls.set(calls.get() + 1);
                    Ok(record("CN"))
                })
                .unwrap();
            assert_eq!(r, record("CN"));
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_errors_not_cached() {
        let cache = ResolutionCache::new(CacheMode::Slots, 1);
        let err = cache.get_or_compute(0, || Err(QqwryError::Format("bad".into())));
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_compute(0, || Ok(record("US"))).unwrap(), record("US"));
    }

    #[test]
    fn test_lru_evicts() {
        let cache = ResolutionCache::new(CacheMode::Lru(2), 100);
        for i in 0..3 {
            cache.get_or_compute(i, || Ok(record("X"))).unwrap();
        }
        assert_eq!(cache.len(), 2);
        // Position 0 was evicted and must be recomputed
        let calls = Cell::new(0);
        cache
            .get_or_compute(0, || {
                calls.set(1);
                Ok(record("X"))
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_capacity_lru_disables() {
        let cache = ResolutionCache::new(CacheMode::Lru(0), 10);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_disabled_always_computes() {
        let cache = ResolutionCache::new(CacheMode::Disabled, 10);
        let calls = Cell::new(0);
        for _ in 0..2 {
            cache
                .get_or_compute(1, || {
                    calls.set(calls.get() + 1);
                    Ok(record("JP"))
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_clear() {
        let mut cache = ResolutionCache::new(CacheMode::Slots, 2);
        cache.get_or_compute(0, || Ok(record("A"))).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_concurrent_slot_fill() {
        let cache = ResolutionCache::new(CacheMode::Slots, 8);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for pos in 0..8 {
                        let r = cache
                            .get_or_compute(pos, || Ok(record(&pos.to_string())))
                            .unwrap();
                        assert_eq!(r, record(&pos.to_string()));
                    }
                });
            }
        });
        assert_eq!(cache.len(), 8);
    }
}
