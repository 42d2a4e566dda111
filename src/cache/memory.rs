//! In-process cache backend on a sharded concurrent map.

use super::{CacheEntry, CacheError, CacheStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Concurrent in-memory store. Each key lives in one shard, so a write
/// replaces the previous entry under that shard's lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        let entry = match self.entries.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        if entry.is_expired(now) {
            // lazy prune; a concurrent fresh write for the key is kept
            self.entries.remove_if(key, |_, current| current.is_expired(now));
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn entry(key: &str, payload: &str, ttl: Option<Duration>) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            key: key.to_string(),
            payload: payload.to_string(),
            created_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    #[test]
    fn test_put_replaces() {
        let store = MemoryStore::new();
        store.put(entry("k", "1", None)).unwrap();
        store.put(entry("k", "2", None)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        let got = store.get("k", Utc::now()).unwrap().unwrap();
        assert_eq!(got.payload, "2");
    }

    #[test]
    fn test_expired_entries_are_absent() {
        let store = MemoryStore::new();
        store.put(entry("old", "1", Some(Duration::seconds(-1)))).unwrap();
        store.put(entry("new", "2", Some(Duration::hours(1)))).unwrap();

        assert!(store.get("old", Utc::now()).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("new", Utc::now()).unwrap().is_some());

        let later = Utc::now() + Duration::hours(2);
        assert_eq!(store.purge_expired(later).unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let store = MemoryStore::new();
        store.put(entry("a", "1", None)).unwrap();
        store.put(entry("b", "1", None)).unwrap();
        assert!(store.invalidate("a").unwrap());
        assert!(!store.invalidate("a").unwrap());
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_concurrent_writers_same_key() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.put(entry("shared", &i.to_string(), None)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 1);
    }
}
