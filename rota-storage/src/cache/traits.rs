//! Cache backend trait and error type.

use async_trait::async_trait;
use std::time::Duration;

/// Error type for cache backend operations.
///
/// These never escape [`super::KeyValueCache`]: the wrapper converts every
/// variant into a miss or a no-op. Backends still report them precisely so
/// the fallback branch can log what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Corrupt entry for key {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache backend trait for pluggable implementations.
///
/// Keys are opaque strings, already namespaced by the caller. Values are
/// strings; callers serialize structured data themselves. Entries carry a
/// TTL and read as absent once expired.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value with the given time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a value. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Increment an integer value, preserving its remaining TTL.
    ///
    /// Returns the new count. A missing or expired key is an error; the
    /// fixed-window rate limiter always seeds the key with `set` first.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Check for a live (non-expired) entry.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Health probe.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Statistics about cache usage, tracked by the fail-open wrapper.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including absorbed backend errors).
    pub misses: u64,
    /// Number of backend errors absorbed by the fail-open policy.
    pub errors: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
