//! SQLite cache backend
//!
//! Persistent store shared by every cache namespace in one directory.
//! Timestamps are stored as milliseconds since the Unix epoch.

use super::{CacheEntry, CacheError, CacheStore};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store for one cache namespace
pub struct SqliteStore {
    db_path: PathBuf,
    namespace: String,
}

impl SqliteStore {
    /// Open or create the cache database in `cache_dir`
    pub fn open(cache_dir: &Path, namespace: &str) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir)?;
        let db_path = cache_dir.join("compat_cache.db");

        let conn = Self::connect(&db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key_hash TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                PRIMARY KEY (namespace, key_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(namespace, expires_at);
            "#,
        )?;

        tracing::debug!(
            "[Cache] Opened SQLite store '{}' at {}",
            namespace,
            db_path.display()
        );

        Ok(Self {
            db_path,
            namespace: namespace.to_string(),
        })
    }

    fn connect(path: &Path) -> Result<Connection, CacheError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn conn(&self) -> Result<Connection, CacheError> {
        Self::connect(&self.db_path)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl CacheStore for SqliteStore {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT payload, created_at, expires_at
                FROM cache_entries
                WHERE namespace = ?1 AND key_hash = ?2
                "#,
                params![self.namespace, key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((payload, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            created_at: from_millis(created_at),
            expires_at: expires_at.map(from_millis),
        };
        if entry.is_expired(now) {
            conn.execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key_hash = ?2 AND expires_at <= ?3",
                params![self.namespace, key, now.timestamp_millis()],
            )?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn put(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so concurrent writers of
        // the same key serialize instead of interleaving delete and insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key_hash = ?2",
            params![self.namespace, entry.key],
        )?;
        tx.execute(
            r#"
            INSERT INTO cache_entries (namespace, key_hash, payload, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                self.namespace,
                entry.key,
                entry.payload,
                entry.created_at.timestamp_millis(),
                entry.expires_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND key_hash = ?2",
            params![self.namespace, key],
        )?;
        Ok(removed > 0)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![self.namespace, now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn clear(&self) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?1",
            params![self.namespace],
        )?;
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
            params![self.namespace],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}
