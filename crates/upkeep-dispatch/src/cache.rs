//! Short-lived read cache for read-mostly data (policy book, provider
//! rosters). Entries expire after a fixed TTL; a zero TTL disables caching.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Key/value cache with a fixed time-to-live.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A fresh value for `key`, if cached.
    pub fn get(&self, key: &K) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read();
        let (stored_at, value) = entries.get(key)?;
        (stored_at.elapsed() < self.ttl).then(|| value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.write().insert(key, (Instant::now(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("book", 7);
        assert_eq!(cache.get(&"book"), Some(7));
        assert_eq!(cache.get(&"roster"), None);
    }

    #[test]
    fn zero_ttl_disables() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert(1, "x");
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn expired_entries_miss() {
        let cache = TtlCache::new(Duration::from_millis(1));
        cache.insert(1, "x");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&1), None);
    }
}
