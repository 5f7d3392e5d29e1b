use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of entries each worker keeps in memory
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded in-memory map of `short_code -> original_url` in front of the store.
///
/// Eviction is pure insertion order (FIFO): once full, the next new key pushes
/// out whichever present key was inserted first. Lookups never reorder
/// anything, so a hot entry can be evicted before a cold one. A hit saves a
/// store round trip; a miss is always answered by the store.
///
/// Each worker process builds its own instance at startup. Caches are never
/// shared or invalidated across workers, which is fine because a cached
/// mapping never changes after insert.
///
/// Clones share the same underlying storage.
#[derive(Clone, Debug)]
pub struct AcceleratorCache {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    /// Keys in the order they were first inserted
    order: VecDeque<String>,
}

impl AcceleratorCache {
    /// Creates a cache holding at most `capacity` entries. A capacity of zero
    /// disables caching: every `put` is dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            })),
            capacity,
        }
    }

    /// Looks up a short code. Returns a clone of the original URL if present.
    pub fn get(&self, short_code: &str) -> Option<String> {
        self.inner.lock().entries.get(short_code).cloned()
    }

    /// Inserts a mapping, evicting the oldest insertion if the cache is full.
    ///
    /// Re-inserting a present key replaces its value but keeps its place in
    /// the eviction order.
    pub fn put(&self, short_code: impl Into<String>, original_url: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }

        let short_code = short_code.into();
        let original_url = original_url.into();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.entries.get_mut(&short_code) {
            *existing = original_url;
            return;
        }

        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        inner.order.push_back(short_code.clone());
        inner.entries.insert(short_code, original_url);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AcceleratorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn get_returns_what_was_put() {
        let cache = AcceleratorCache::new(4);
        cache.put("abc", "https://example.com/a");

        assert_eq!(cache.get("abc").as_deref(), Some("https://example.com/a"));
        assert_eq!(cache.get("zzz"), None);
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = AcceleratorCache::new(3);
        for i in 0..10 {
            cache.put(format!("code{}", i), format!("https://example.com/{}", i));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn evicts_earliest_insertion_first() {
        let cache = AcceleratorCache::new(3);
        cache.put("a", "1");
        cache.put("b", "2");
        cache.put("c", "3");
        cache.put("d", "4");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("d").as_deref(), Some("4"));
    }

    #[test]
    fn lookups_do_not_protect_entries() {
        let cache = AcceleratorCache::new(2);
        cache.put("hot", "1");
        cache.put("cold", "2");

        for _ in 0..100 {
            assert!(cache.get("hot").is_some());
        }
        cache.put("new", "3");

        // FIFO, not LRU: the frequently read entry still goes first
        assert_eq!(cache.get("hot"), None);
        assert_eq!(cache.get("cold").as_deref(), Some("2"));
    }

    #[test]
    fn reinsert_keeps_original_position() {
        let cache = AcceleratorCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");
        cache.put("a", "1-again");
        cache.put("c", "3");

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_replaces_value() {
        let cache = AcceleratorCache::new(2);
        cache.put("a", "1");
        cache.put("a", "2");
        assert_eq!(cache.get("a").as_deref(), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = AcceleratorCache::new(0);
        cache.put("a", "1");
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn clones_share_storage() {
        let cache = AcceleratorCache::new(2);
        let other = cache.clone();
        other.put("a", "1");
        assert_eq!(cache.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn concurrent_puts_stay_bounded() {
        let cache = AcceleratorCache::new(64);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..1_000 {
                        cache.put(format!("t{}-{}", t, i), "https://example.com");
                        let _ = cache.get(&format!("t{}-{}", t, i / 2));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 64);
        let inner = cache.inner.lock();
        assert_eq!(inner.order.len(), inner.entries.len());
    }
}
