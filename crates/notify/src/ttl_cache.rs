//! Expiring in-memory map for short-lived verification artifacts.

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: i64,
}

/// Concurrent map whose entries die after a deadline. Expiry is lazy:
/// dead entries are dropped on access or by `purge_expired`.
pub struct TtlCache<V: Clone> {
    entries: DashMap<String, Entry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: V, expires_at: i64) {
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }

    /// Remove and return the live value for `key`. A second call for the
    /// same key returns None, which is what makes single-use tokens
    /// single-use.
    pub fn consume(&self, key: &str, now: i64) -> Option<V> {
        let (_, entry) = self.entries.remove(key)?;
        (entry.expires_at >= now).then_some(entry.value)
    }

    /// Non-consuming lookup. Expired entries are dropped on the way.
    pub fn get(&self, key: &str, now: i64) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at >= now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn purge_expired(&self, now: i64) {
        self.entries.retain(|_, entry| entry.expires_at >= now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_is_single_use() {
        let cache = TtlCache::new();
        cache.put("code", 42i64, 100);
        assert_eq!(cache.consume("code", 50), Some(42));
        assert_eq!(cache.consume("code", 50), None);
    }

    #[test]
    fn test_expired_entries_are_dead() {
        let cache = TtlCache::new();
        cache.put("a", 1i64, 100);
        cache.put("b", 2i64, 100);

        assert_eq!(cache.get("a", 100), Some(1));
        assert_eq!(cache.get("a", 101), None);
        assert_eq!(cache.consume("b", 101), None);
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new();
        cache.put("old", 1i64, 100);
        cache.put("new", 2i64, 300);
        cache.purge_expired(200);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new", 200), Some(2));
    }
}
