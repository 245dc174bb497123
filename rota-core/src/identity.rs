//! Identity types for ROTA entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Owner identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type OwnerId = Uuid;

/// Identifier for a background extraction task.
pub type TaskId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// One-way SHA-256 hash of a bearer credential, hex-encoded.
///
/// Plaintext credentials are never persisted; the durable store and the
/// blacklist only ever see this hash.
pub type TokenHash = String;

/// Generate a new UUIDv7 OwnerId (timestamp-sortable).
pub fn new_owner_id() -> OwnerId {
    Uuid::now_v7()
}

/// Generate a new UUIDv7 TaskId (timestamp-sortable).
pub fn new_task_id() -> TaskId {
    Uuid::now_v7()
}

/// Compute the SHA-256 hash of a bearer credential.
pub fn hash_token(token: &str) -> TokenHash {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn test_hash_token_is_hex_sha256() {
        let hash = hash_token("secret-token");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_owner_ids_are_sortable_by_creation() {
        let a = new_owner_id();
        let b = new_owner_id();
        assert!(a <= b);
    }
}
