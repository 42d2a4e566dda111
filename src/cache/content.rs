//! Typed cache over a [`CacheStore`] with expiry and hit/miss accounting.

use super::{CacheEntry, CacheError, CacheStore};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of one cache's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Content-addressed cache of `V`.
///
/// Backing-store failures are logged and treated as misses; they never
/// surface to callers.
pub struct ContentCache<V> {
    name: &'static str,
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

impl<V> ContentCache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(name: &'static str, store: Arc<dyn CacheStore>, ttl: Option<Duration>) -> Self {
        Self {
            name,
            store,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            _value: PhantomData,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    /// Look up `key` as of `now`
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        match self.load(key, now) {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("[Cache] {} hit {}", self.name, &key[..key.len().min(12)]);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("[Cache] {} read failed, treating as miss: {}", self.name, e);
                None
            }
        }
    }

    fn load(&self, key: &str, now: DateTime<Utc>) -> Result<Option<V>, CacheError> {
        let Some(entry) = self.store.get(key, now)? else {
            return Ok(None);
        };
        match serde_json::from_str(&entry.payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // unreadable payloads (e.g. from an older schema) are dropped
                self.store.invalidate(key)?;
                Err(e.into())
            }
        }
    }

    pub fn put(&self, key: &str, value: &V) {
        self.put_at(key, value, Utc::now())
    }

    /// Store `value` under `key`, created at `now`
    pub fn put_at(&self, key: &str, value: &V, now: DateTime<Utc>) {
        let result = serde_json::to_string(value)
            .map_err(CacheError::from)
            .and_then(|payload| {
                self.store.put(CacheEntry {
                    key: key.to_string(),
                    payload,
                    created_at: now,
                    // a lifetime past the end of the calendar never expires
                    expires_at: self.ttl.and_then(|ttl| now.checked_add_signed(ttl)),
                })
            });
        if let Err(e) = result {
            tracing::warn!("[Cache] {} write failed: {}", self.name, e);
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.invalidate(key) {
            tracing::warn!("[Cache] {} invalidate failed: {}", self.name, e);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!("[Cache] {} clear failed: {}", self.name, e);
        }
    }

    /// Sweep expired entries as of `now`
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        match self.store.purge_expired(now) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!("[Cache] {} purged {} expired entries", self.name, removed);
                }
                removed
            }
            Err(e) => {
                tracing::warn!("[Cache] {} purge failed: {}", self.name, e);
                0
            }
        }
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len().unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
