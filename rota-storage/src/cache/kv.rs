//! Fail-open key/value cache wrapper.
//!
//! [`KeyValueCache`] is the only cache surface the service layer sees.
//! Every backend error is absorbed here: reads become misses, writes and
//! invalidations become no-ops, and a structured warning is emitted. The
//! one deliberate consequence is that `is_blacklisted` fails open to
//! `false` when the backend is down; the durable store remains the
//! authority on credential state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::traits::{CacheBackend, CacheStats};

/// Default retention for blacklist entries. The blacklist is a transient
/// denial list, not a permanent record: entries expire automatically.
pub const DEFAULT_BLACKLIST_TTL: Duration = Duration::from_secs(86_400);

/// TTL-bounded cache-aside layer over a pluggable backend.
///
/// Cloneable; all clones share the backend and statistics.
#[derive(Clone)]
pub struct KeyValueCache {
    backend: Arc<dyn CacheBackend>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl KeyValueCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    // ========================================================================
    // KEY NAMESPACES
    //
    // One namespace per owning component. Only CredentialRegistry touches
    // `user:`/`blacklist:`/`ratelimit:` keys, only ConfigStore touches
    // `setting:` keys.
    // ========================================================================

    pub fn user_key(token_hash: &str) -> String {
        format!("user:{token_hash}")
    }

    pub fn setting_key(key: &str) -> String {
        format!("setting:{key}")
    }

    pub fn blacklist_key(token_hash: &str) -> String {
        format!("blacklist:{token_hash}")
    }

    pub fn rate_limit_key(identity_key: &str) -> String {
        format!("ratelimit:{identity_key}")
    }

    // ========================================================================
    // FAIL-OPEN PRIMITIVES
    // ========================================================================

    /// Get a value; any backend error reads as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.record_error();
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a value; failure is logged and swallowed.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self.backend.set(key, value, ttl).await {
            self.record_error();
            tracing::warn!(key, error = %e, "cache write failed, skipping");
        }
    }

    /// Remove a value.
    ///
    /// Called synchronously after every durable write, before the write is
    /// reported successful, bounding staleness to at most one
    /// read-your-own-write race. Failure is logged and swallowed: the entry
    /// then ages out by TTL instead.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            self.record_error();
            tracing::warn!(key, error = %e, "cache invalidation failed, entry will age out");
        }
    }

    /// Typed read: deserialize a cached JSON value. A corrupt entry reads
    /// as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupt cache entry, treating as miss");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Typed write: serialize a value to JSON and store it.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(e) => tracing::warn!(key, error = %e, "cache serialization failed, skipping"),
        }
    }

    // ========================================================================
    // BLACKLIST
    // ========================================================================

    /// Add a credential hash to the blacklist with a bounded expiry.
    ///
    /// Returns whether the entry was actually written. A `false` return
    /// means revocation relies on the durable store alone (the rotate step
    /// still makes the old credential unusable).
    pub async fn blacklist(&self, token_hash: &str, ttl: Duration) -> bool {
        let key = Self::blacklist_key(token_hash);
        match self.backend.set(&key, "1", ttl).await {
            Ok(()) => {
                tracing::info!(prefix = &token_hash[..token_hash.len().min(10)], "credential blacklisted");
                true
            }
            Err(e) => {
                self.record_error();
                tracing::warn!(error = %e, "blacklist write failed");
                false
            }
        }
    }

    /// Check the blacklist. Fails open to `false`: the check is an
    /// accelerator for instant revocation, the durable store is the
    /// authority.
    pub async fn is_blacklisted(&self, token_hash: &str) -> bool {
        let key = Self::blacklist_key(token_hash);
        match self.backend.exists(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                self.record_error();
                tracing::warn!(error = %e, "blacklist check failed, allowing");
                false
            }
        }
    }

    // ========================================================================
    // RATE LIMITING
    // ========================================================================

    /// Fixed-window counter. Returns `true` while the caller is within
    /// `limit` requests per `window`; fails open to `true` when the backend
    /// is unavailable, since availability is prioritized over strict
    /// limiting.
    pub async fn check_rate_limit(&self, identity_key: &str, limit: i64, window: Duration) -> bool {
        let key = Self::rate_limit_key(identity_key);

        let current = match self.backend.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                self.record_error();
                tracing::warn!(error = %e, "rate limit check failed, allowing");
                return true;
            }
        };

        match current {
            None => {
                // First request in this window.
                if let Err(e) = self.backend.set(&key, "1", window).await {
                    self.record_error();
                    tracing::warn!(error = %e, "rate limit seed failed, allowing");
                }
                true
            }
            Some(raw) => {
                let count: i64 = raw.parse().unwrap_or(0);
                if count >= limit {
                    return false;
                }
                if let Err(e) = self.backend.incr(&key).await {
                    self.record_error();
                    tracing::warn!(error = %e, "rate limit increment failed, allowing");
                }
                true
            }
        }
    }

    // ========================================================================
    // HEALTH & STATS
    // ========================================================================

    /// Backend health probe.
    pub async fn ping(&self) -> bool {
        self.backend.ping().await.is_ok()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}
