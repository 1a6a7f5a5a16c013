//! Bounded per-index body cache.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Maps encoded key prefixes to body bytes for one unordered index.
///
/// Entries are only ever added for bodies known to be stored: after a
/// successful commit or a successful read.
pub struct IndexCache {
    entries: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
}

impl IndexCache {
    /// Creates a cache holding at most `capacity` bodies.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a cached body.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    /// Returns `true` if a body is cached for `key`.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.lock().contains(key)
    }

    /// Caches a body, evicting the least recently used one when full.
    pub fn insert(&self, key: Vec<u8>, body: Vec<u8>) {
        self.entries.lock().put(key, body);
    }

    /// Drops the body cached for `key`.
    pub fn remove(&self, key: &[u8]) {
        self.entries.lock().pop(key);
    }

    /// Drops every body whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &[u8]) {
        let mut entries = self.entries.lock();
        let doomed: Vec<Vec<u8>> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            entries.pop(&key);
        }
    }

    /// Number of cached bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached bodies.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> IndexCache {
        IndexCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let cache = cache(4);
        cache.insert(b"k".to_vec(), b"v".to_vec());
        assert_eq!(cache.get(b"k"), Some(b"v".to_vec()));
        cache.remove(b"k");
        assert_eq!(cache.get(b"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2);
        cache.insert(b"a".to_vec(), vec![1]);
        cache.insert(b"b".to_vec(), vec![2]);
        let _ = cache.get(b"a");
        cache.insert(b"c".to_vec(), vec![3]);

        assert!(cache.contains(b"a"));
        assert!(!cache.contains(b"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn remove_prefix_drops_matching_keys() {
        let cache = cache(8);
        cache.insert(b"s1-a".to_vec(), vec![]);
        cache.insert(b"s1-b".to_vec(), vec![]);
        cache.insert(b"s2-a".to_vec(), vec![]);
        cache.remove_prefix(b"s1");
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(b"s2-a"));
    }
}
