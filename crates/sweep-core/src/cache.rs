//! Reuse of allocated buffer sets between runs of the same shape.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::layout::{BufferSet, ShapeKey};

/// A buffer set handed out by the cache. Contents are whatever the last run
/// left; callers reset before use.
pub type SharedBuffers = Arc<Mutex<BufferSet>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// FIFO cache of buffer sets keyed by [`ShapeKey`].
#[derive(Debug, Default)]
pub struct OutputCache {
    max_size: usize,
    entries: VecDeque<(ShapeKey, SharedBuffers)>,
}

impl OutputCache {
    /// `max_size == 0` disables caching.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: VecDeque::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Return the set stored under `key`, or allocate one with `alloc` and
    /// insert it, evicting the oldest entries beyond `max_size`.
    pub fn get_or_allocate<F>(&mut self, key: ShapeKey, alloc: F) -> (SharedBuffers, CacheOutcome)
    where
        F: FnOnce(ShapeKey) -> BufferSet,
    {
        if let Some((_, hit)) = self.entries.iter().find(|(k, _)| *k == key) {
            debug!(conf_count = key.conf_count, rows = key.rows, "buffer cache hit");
            return (Arc::clone(hit), CacheOutcome::Hit);
        }

        let fresh = Arc::new(Mutex::new(alloc(key)));
        if self.max_size > 0 {
            self.entries.push_back((key, Arc::clone(&fresh)));
            while self.entries.len() > self.max_size {
                if let Some((old, _)) = self.entries.pop_front() {
                    debug!(conf_count = old.conf_count, rows = old.rows, "buffer cache evict");
                }
            }
        }
        debug!(conf_count = key.conf_count, rows = key.rows, "buffer cache miss");
        (fresh, CacheOutcome::Miss)
    }

    pub fn contains(&self, key: &ShapeKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{IndicatorEnabled, ScratchWidths};

    fn key(conf: usize) -> ShapeKey {
        ShapeKey {
            conf_count: conf,
            rows: 4,
            rows2: 1,
            scratch: ScratchWidths::default(),
            min_rows: 1,
            enabled: IndicatorEnabled::all(),
            enabled2: IndicatorEnabled::none(),
        }
    }

    #[test]
    fn test_same_key_returns_same_buffers() {
        let mut cache = OutputCache::new(1);
        let (a, first) = cache.get_or_allocate(key(2), BufferSet::allocate);
        let (b, second) = cache.get_or_allocate(key(2), BufferSet::allocate);
        assert_eq!(first, CacheOutcome::Miss);
        assert_eq!(second, CacheOutcome::Hit);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = OutputCache::new(1);
        let (a, _) = cache.get_or_allocate(key(2), BufferSet::allocate);
        cache.get_or_allocate(key(3), BufferSet::allocate);
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&key(2)));
        let (c, outcome) = cache.get_or_allocate(key(2), BufferSet::allocate);
        assert_eq!(outcome, CacheOutcome::Miss);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_eviction_is_insertion_order_not_recency() {
        let mut cache = OutputCache::new(2);
        cache.get_or_allocate(key(1), BufferSet::allocate);
        cache.get_or_allocate(key(2), BufferSet::allocate);
        // a hit does not refresh the entry
        cache.get_or_allocate(key(1), BufferSet::allocate);
        cache.get_or_allocate(key(3), BufferSet::allocate);
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
    }

    #[test]
    fn test_zero_size_disables_cache() {
        let mut cache = OutputCache::new(0);
        let (a, _) = cache.get_or_allocate(key(1), BufferSet::allocate);
        let (b, outcome) = cache.get_or_allocate(key(1), BufferSet::allocate);
        assert_eq!(outcome, CacheOutcome::Miss);
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
    }
}
