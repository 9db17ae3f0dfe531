//! Bounded freshness caches.
//!
//! Two shapes cover every cache the engine carries:
//!
//! - [`MembershipCache`]: a bounded LRU id set recording facts already
//!   confirmed against the index (transaction indexed, change set indexed,
//!   cascade processed). Purged wholesale on rollback.
//! - [`HarvestCache`]: a bounded LRU id → timestamp map recording transactions
//!   whose dirty/new content has already been harvested. Entries older than a
//!   retention window are purged on a throttled schedule so genuinely-failed
//!   harvests are retried automatically.
//!
//! Both are injected, engine-owned objects; the locks are held only for O(1)
//! map operations. Callers pass the current time explicitly, which keeps the
//! age-based purge deterministic under test.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Bounded LRU set of ids confirmed present (in the index, or processed).
#[derive(Debug)]
pub struct MembershipCache {
    entries: Mutex<LruCache<u64, ()>>,
}

impl MembershipCache {
    /// Create a cache bounded to `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; capacities come from validated config.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record an id, evicting the least-recently-used entry when full.
    pub fn insert(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .put(id, ());
    }

    /// Whether an id is recorded. Refreshes the entry's recency.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&id)
            .is_some()
    }

    /// Forget one id.
    pub fn remove(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop(&id);
    }

    /// Forget everything (rollback hook, CLEAR maintenance operations).
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Number of recorded ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct HarvestState {
    entries: LruCache<u64, u64>,
    last_purged_ms: u64,
}

/// Bounded LRU map of transaction id → harvest timestamp.
#[derive(Debug)]
pub struct HarvestCache {
    state: Mutex<HarvestState>,
    retention_ms: u64,
    purge_interval_ms: u64,
}

impl HarvestCache {
    /// Create a cache bounded to `capacity` entries with the given retention
    /// window and purge throttle.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; capacities come from validated config.
    #[must_use]
    pub fn new(capacity: usize, retention_ms: u64, purge_interval_ms: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            state: Mutex::new(HarvestState {
                entries: LruCache::new(capacity),
                last_purged_ms: 0,
            }),
            retention_ms,
            purge_interval_ms,
        }
    }

    /// Record a transaction as harvested at `now_ms`.
    pub fn record(&self, txn_id: u64, now_ms: u64) {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .put(txn_id, now_ms);
    }

    /// Whether a transaction has been harvested (and not yet purged).
    #[must_use]
    pub fn contains(&self, txn_id: u64) -> bool {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .contains(&txn_id)
    }

    /// Forget one transaction so its content is re-surfaced immediately.
    pub fn remove(&self, txn_id: u64) {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .pop(&txn_id);
    }

    /// Forget everything (rollback hook).
    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .clear();
    }

    /// Purge entries older than the retention window.
    ///
    /// Throttled: a purge pass runs at most once per purge interval; calls in
    /// between are no-ops. Returns how many entries were purged.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if now_ms.saturating_sub(state.last_purged_ms) < self.purge_interval_ms {
            return 0;
        }
        state.last_purged_ms = now_ms;

        let expired: Vec<u64> = state
            .entries
            .iter()
            .filter(|(_, recorded_at)| now_ms.saturating_sub(**recorded_at) > self.retention_ms)
            .map(|(txn_id, _)| *txn_id)
            .collect();
        for txn_id in &expired {
            state.entries.pop(txn_id);
        }
        expired.len()
    }

    /// Number of recorded transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
