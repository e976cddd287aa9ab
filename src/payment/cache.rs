//! LRU cache of granted (buyer, item) pairs.
//!
//! Access is never revoked once granted, so a positive answer can be served
//! from memory indefinitely. Negative answers are never cached.

use crate::session::{BuyerId, ItemId};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Cache key.
pub type AccessKey = (BuyerId, ItemId);

/// Counters exposed for monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the store.
    pub misses: u64,
    /// Grants recorded.
    pub additions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 * 100.0 / total as f64,
        }
    }
}

struct Slots {
    granted: LruCache<AccessKey, ()>,
    stats: CacheStats,
}

/// Bounded set of pairs known to have access.
pub struct GrantCache {
    slots: Mutex<Slots>,
}

impl GrantCache {
    /// Cache holding up to `capacity` pairs (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(Slots {
                granted: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Whether `key` is known to have access. Counts as a hit or a miss.
    pub fn contains(&self, key: &AccessKey) -> bool {
        let mut slots = self.slots.lock();
        let found = slots.granted.get(key).is_some();
        if found {
            slots.stats.hits += 1;
        } else {
            slots.stats.misses += 1;
        }
        found
    }

    /// Remember that `key` has access.
    pub fn insert(&self, key: AccessKey) {
        let mut slots = self.slots.lock();
        if slots.granted.put(key, ()).is_none() {
            slots.stats.additions += 1;
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.slots.lock().stats
    }

    /// Pairs currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().granted.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
