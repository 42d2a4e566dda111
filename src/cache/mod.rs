//! Content-addressed caches
//!
//! Entries are keyed by a SHA-256 hash of their input (normalized
//! expression text, or a sorted item-id set) and replaced wholesale on write.
//! Two backends implement [`CacheStore`]: an in-process [`MemoryStore`] and a
//! SQLite-backed [`SqliteStore`]. [`ContentCache`] adds typed access, expiry
//! and hit/miss accounting on top of either.

pub mod content;
pub mod memory;
pub mod sqlite;

pub use content::{CacheStats, ContentCache};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One stored value with its lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON value
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Storage backend for cache entries.
///
/// `put` replaces any existing entry for the key atomically with respect to
/// other writers of the same key. Expired entries are never returned.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError>;

    fn put(&self, entry: CacheEntry) -> Result<(), CacheError>;

    fn invalidate(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove all entries expired at `now`, returning how many were removed
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError>;

    fn clear(&self) -> Result<(), CacheError>;

    fn len(&self) -> Result<usize, CacheError>;

    fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

/// Hex SHA-256 of `data`
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Expression text trimmed with inner whitespace collapsed
pub fn normalize_expression(expression: &str) -> String {
    expression.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key for an expression: normalized, then lower-cased
pub fn expression_key(expression: &str) -> String {
    content_hash(normalize_expression(expression).to_lowercase().as_bytes())
}

/// Key for an item-id set: order and duplicates do not matter
pub fn item_set_key(ids: &[i64]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let joined = sorted
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    content_hash(joined.as_bytes())
}
