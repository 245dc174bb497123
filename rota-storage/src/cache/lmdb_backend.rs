//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key/value store that survives process restarts.
//!
//! # Entry layout
//!
//! Each value is stored as `[expires_at_millis: 8 bytes BE][payload]`.
//! Expired entries read as absent; they are reclaimed on the next write to
//! the same key.
//!
//! # Thread safety
//!
//! LMDB provides ACID transactions: read transactions for `get`/`exists`,
//! write transactions for `set`/`delete`/`incr`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::traits::{CacheBackend, CacheError};

const EXPIRY_PREFIX_LEN: usize = 8;

/// LMDB-backed cache.
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Str, Bytes>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn encode(value: &str, ttl: Duration) -> Vec<u8> {
        let expires_at = Self::now_millis().saturating_add(ttl.as_millis() as i64);
        let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
        bytes.extend_from_slice(&expires_at.to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    /// Decode an entry, returning the payload and its absolute expiry.
    fn decode(key: &str, bytes: &[u8]) -> Result<(String, i64), CacheError> {
        if bytes.len() < EXPIRY_PREFIX_LEN {
            return Err(CacheError::CorruptEntry {
                key: key.to_string(),
                reason: format!("entry too short: {} bytes", bytes.len()),
            });
        }
        let mut prefix = [0u8; EXPIRY_PREFIX_LEN];
        prefix.copy_from_slice(&bytes[..EXPIRY_PREFIX_LEN]);
        let expires_at = i64::from_be_bytes(prefix);
        let payload = String::from_utf8(bytes[EXPIRY_PREFIX_LEN..].to_vec()).map_err(|e| {
            CacheError::CorruptEntry {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok((payload, expires_at))
    }

    /// Read a live entry inside its own read transaction.
    fn read_live(&self, key: &str) -> Result<Option<(String, i64)>, CacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;

        match self
            .db
            .get(&rtxn, key)
            .map_err(|e| CacheError::Transaction(e.to_string()))?
        {
            Some(bytes) => {
                let (payload, expires_at) = Self::decode(key, bytes)?;
                if Self::now_millis() >= expires_at {
                    Ok(None)
                } else {
                    Ok(Some((payload, expires_at)))
                }
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.read_live(key)?.map(|(payload, _)| payload))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let bytes = Self::encode(value, ttl);

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key, &bytes)
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        // Read, bump, write back with the original expiry preserved.
        let (payload, expires_at) = self
            .read_live(key)?
            .ok_or_else(|| CacheError::Transaction(format!("incr on missing key {key}")))?;

        let count: i64 = payload.parse().map_err(|_| CacheError::CorruptEntry {
            key: key.to_string(),
            reason: format!("not an integer: {payload}"),
        })?;
        let next = count + 1;

        let next_str = next.to_string();
        let mut bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + next_str.len());
        bytes.extend_from_slice(&expires_at.to_be_bytes());
        bytes.extend_from_slice(next_str.as_bytes());

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key, &bytes)
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CacheError::Transaction(e.to_string()))?;
        Ok(next)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.read_live(key)?.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        // A read transaction exercises the environment end to end.
        self.env
            .read_txn()
            .map(|_| ())
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_backend() -> (tempfile::TempDir, LmdbCacheBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LmdbCacheBackend::new(dir.path(), 16).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_dir, backend) = open_backend();
        backend
            .set("user:abc", "{\"name\":\"A\"}", Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(
            backend.get("user:abc").await.unwrap(),
            Some("{\"name\":\"A\"}".to_string())
        );

        backend.delete("user:abc").await.unwrap();
        assert_eq!(backend.get("user:abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let (_dir, backend) = open_backend();
        backend.set("k", "v", Duration::ZERO).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_preserves_expiry_window() {
        let (_dir, backend) = open_backend();
        backend
            .set("ratelimit:u1", "1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.incr("ratelimit:u1").await.unwrap(), 2);
        assert_eq!(backend.incr("ratelimit:u1").await.unwrap(), 3);
        assert_eq!(
            backend.get("ratelimit:u1").await.unwrap(),
            Some("3".to_string())
        );
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, backend) = open_backend();
        backend.ping().await.unwrap();
    }
}
