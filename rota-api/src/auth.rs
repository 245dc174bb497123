//! Authentication Module
//!
//! Resolves opaque bearer credentials to identities. The flow is ordered
//! for the revocation-wins invariant:
//!
//! 1. blacklist check, unconditionally, bypassing the cache - a revoked
//!    credential fails here no matter what the cache still holds;
//! 2. master-key match for the distinguished administrative identity;
//! 3. cached identity lookup with a bounded TTL;
//! 4. durable-store lookup by one-way credential hash.
//!
//! Every rejection reads as the same `Forbidden`: the caller cannot learn
//! whether a credential is unknown, inactive or blacklisted.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use rota_core::{
    hash_token, new_owner_id, AuthError, EntityKind, Identity, OwnerId, RotaError, RotaResult,
    StorageError,
};
use rota_storage::{IdentityRepository, KeyValueCache};

// ============================================================================
// MASTER KEY (TYPE-SAFE)
// ============================================================================

/// Type-safe master credential that prevents accidental logging.
///
/// The master key maps to the administrative identity without a hash
/// lookup, but it still participates in blacklist checks: a revoked master
/// key is dead like any other credential.
#[derive(Clone)]
pub struct MasterKey(SecretString);

impl MasterKey {
    /// Create a master key. Empty strings are rejected: an empty master
    /// key would turn every empty header into an admin session.
    pub fn new(secret: String) -> Option<Self> {
        if secret.is_empty() {
            None
        } else {
            Some(Self(SecretString::new(secret.into())))
        }
    }

    /// Compare against a presented token.
    pub fn matches(&self, token: &str) -> bool {
        // Hash both sides so the comparison is over fixed-length values.
        hash_token(self.0.expose_secret()) == hash_token(token)
    }

    /// Hash of the master credential, for blacklist checks.
    pub fn token_hash(&self) -> String {
        hash_token(self.0.expose_secret())
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Master/internal credential for admin and system tasks.
    pub master_key: Option<MasterKey>,

    /// TTL for cached identity lookups (default: 300 seconds).
    pub identity_ttl: Duration,

    /// Retention for blacklist entries (default: 24 hours). The blacklist
    /// is a transient denial list; entries expire on their own.
    pub blacklist_ttl: Duration,

    /// Fixed-window rate limit (default: 100 requests).
    pub rate_limit: i64,

    /// Rate limit window (default: 60 seconds).
    pub rate_limit_window: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            identity_ttl: Duration::from_secs(300),
            blacklist_ttl: rota_storage::cache::kv::DEFAULT_BLACKLIST_TTL,
            rate_limit: 100,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `ROTA_MASTER_KEY`: master/internal credential (optional)
    /// - `ROTA_IDENTITY_TTL_SECS`: identity cache TTL (default: 300)
    /// - `ROTA_BLACKLIST_TTL_SECS`: blacklist retention (default: 86400)
    /// - `ROTA_RATE_LIMIT`: requests per window (default: 100)
    /// - `ROTA_RATE_LIMIT_WINDOW_SECS`: window size (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |var: &str, default: Duration| {
            std::env::var(var)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            master_key: std::env::var("ROTA_MASTER_KEY").ok().and_then(MasterKey::new),
            identity_ttl: secs("ROTA_IDENTITY_TTL_SECS", defaults.identity_ttl),
            blacklist_ttl: secs("ROTA_BLACKLIST_TTL_SECS", defaults.blacklist_ttl),
            rate_limit: std::env::var("ROTA_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit),
            rate_limit_window: secs("ROTA_RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window),
        }
    }
}

// ============================================================================
// CREDENTIAL REGISTRY
// ============================================================================

/// Authenticates tokens, owns identity cache keys, and executes the
/// revocation flow.
///
/// Only this component touches the `user:`, `blacklist:` and `ratelimit:`
/// cache namespaces.
#[derive(Clone)]
pub struct CredentialRegistry {
    identities: Arc<dyn IdentityRepository>,
    cache: KeyValueCache,
    config: AuthConfig,
}

impl CredentialRegistry {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        cache: KeyValueCache,
        config: AuthConfig,
    ) -> Self {
        Self {
            identities,
            cache,
            config,
        }
    }

    /// Generate a fresh bearer credential: 32 random bytes, URL-safe
    /// base64.
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Resolve a bearer token to an identity.
    ///
    /// The blacklist is consulted first and never cached, so revocation
    /// always wins over a warm cache entry.
    pub async fn authenticate(&self, token: &str) -> RotaResult<Identity> {
        if token.is_empty() {
            return Err(AuthError::Forbidden.into());
        }

        let token_hash = hash_token(token);

        if self.cache.is_blacklisted(&token_hash).await {
            tracing::warn!(
                prefix = &token_hash[..10],
                "attempted use of blacklisted credential"
            );
            return Err(AuthError::Forbidden.into());
        }

        if let Some(master) = &self.config.master_key {
            if master.matches(token) {
                return match self.identities.find_admin().await? {
                    Some(admin) => Ok(admin),
                    None => {
                        tracing::warn!("master key presented but no admin identity exists");
                        Err(AuthError::Forbidden.into())
                    }
                };
            }
        }

        let cache_key = KeyValueCache::user_key(&token_hash);
        if let Some(identity) = self.cache.get_json::<Identity>(&cache_key).await {
            return Ok(identity);
        }

        match self.identities.find_by_token_hash(&token_hash).await? {
            Some(identity) => {
                self.cache
                    .set_json(&cache_key, &identity, self.config.identity_ttl)
                    .await;
                Ok(identity)
            }
            None => {
                tracing::warn!(prefix = &token_hash[..10], "invalid credential attempt");
                Err(AuthError::Forbidden.into())
            }
        }
    }

    /// Reset an identity's credential, returning the new plaintext token.
    ///
    /// Order matters: blacklist the old hash, invalidate the cache entry,
    /// then rotate in the store. A concurrent authenticate can therefore
    /// never observe a window where the old credential is neither
    /// blacklisted nor invalidated.
    pub async fn reset_token(&self, owner_id: OwnerId) -> RotaResult<String> {
        let identity = self.require(owner_id).await?;

        self.cache
            .blacklist(&identity.token_hash, self.config.blacklist_ttl)
            .await;
        self.cache
            .invalidate(&KeyValueCache::user_key(&identity.token_hash))
            .await;

        let new_token = Self::generate_token();
        self.identities
            .rotate_token(owner_id, &hash_token(&new_token))
            .await?;

        tracing::info!(%owner_id, "credential reset");
        Ok(new_token)
    }

    /// Revoke an identity outright: blacklist, invalidate, soft-delete.
    pub async fn deactivate(&self, owner_id: OwnerId) -> RotaResult<()> {
        let identity = self.require(owner_id).await?;

        self.cache
            .blacklist(&identity.token_hash, self.config.blacklist_ttl)
            .await;
        self.cache
            .invalidate(&KeyValueCache::user_key(&identity.token_hash))
            .await;
        self.identities.deactivate(owner_id).await?;

        tracing::info!(%owner_id, "identity deactivated");
        Ok(())
    }

    /// Fixed-window rate limit for an identity key. Fails open when the
    /// cache backend is unavailable: availability beats strict limiting.
    pub async fn rate_limit(&self, identity_key: &str) -> bool {
        self.cache
            .check_rate_limit(
                identity_key,
                self.config.rate_limit,
                self.config.rate_limit_window,
            )
            .await
    }

    // ========================================================================
    // IDENTITY ADMINISTRATION
    // ========================================================================

    /// Create an identity with a freshly generated credential. Returns the
    /// identity and the plaintext token, which is shown once and never
    /// stored.
    pub async fn create_identity(
        &self,
        name: &str,
        display_name: &str,
        is_admin: bool,
    ) -> RotaResult<(Identity, String)> {
        let token = Self::generate_token();
        let now = chrono::Utc::now();
        let identity = Identity {
            owner_id: new_owner_id(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            token_hash: hash_token(&token),
            is_active: true,
            is_admin,
            created_at: now,
            updated_at: now,
        };
        self.identities.insert(&identity).await?;
        tracing::info!(owner_id = %identity.owner_id, display_name, "identity created");
        Ok((identity, token))
    }

    /// Update an identity's profile fields, invalidating its cache entry
    /// before reporting success.
    pub async fn update_identity(&self, identity: &Identity) -> RotaResult<()> {
        self.identities.update(identity).await?;
        self.cache
            .invalidate(&KeyValueCache::user_key(&identity.token_hash))
            .await;
        Ok(())
    }

    /// Active identities, ordered by display name.
    pub async fn list_identities(&self) -> RotaResult<Vec<Identity>> {
        self.identities.list_active().await
    }

    async fn require(&self, owner_id: OwnerId) -> RotaResult<Identity> {
        self.identities
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| {
                RotaError::Storage(StorageError::NotFound {
                    kind: EntityKind::Identity,
                    key: owner_id.to_string(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rota_storage::cache::traits::{CacheBackend, CacheError};
    use rota_storage::{MemoryCacheBackend, MemoryIdentityRepository};

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn incr(&self, _: &str) -> Result<i64, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn exists(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn registry_with(config: AuthConfig) -> (Arc<MemoryIdentityRepository>, CredentialRegistry) {
        let repo = Arc::new(MemoryIdentityRepository::new());
        let cache = KeyValueCache::new(Arc::new(MemoryCacheBackend::new()));
        let registry = CredentialRegistry::new(repo.clone(), cache, config);
        (repo, registry)
    }

    fn registry() -> (Arc<MemoryIdentityRepository>, CredentialRegistry) {
        registry_with(AuthConfig::default())
    }

    fn forbidden(result: RotaResult<Identity>) -> bool {
        matches!(result, Err(RotaError::Auth(AuthError::Forbidden)))
    }

    #[tokio::test]
    async fn test_empty_token_is_forbidden() {
        let (_repo, registry) = registry();
        assert!(forbidden(registry.authenticate("").await));
    }

    #[tokio::test]
    async fn test_unknown_token_is_forbidden() {
        let (_repo, registry) = registry();
        assert!(forbidden(registry.authenticate("no-such-token").await));
    }

    #[tokio::test]
    async fn test_authenticate_and_cache() {
        let (repo, registry) = registry();
        let (identity, token) = registry
            .create_identity("anna", "Anna", false)
            .await
            .unwrap();

        let resolved = registry.authenticate(&token).await.unwrap();
        assert_eq!(resolved.owner_id, identity.owner_id);

        // Second call is served from cache: even with the store emptied,
        // the identity still resolves within the TTL.
        repo.deactivate(identity.owner_id).await.unwrap();
        let cached = registry.authenticate(&token).await.unwrap();
        assert_eq!(cached.owner_id, identity.owner_id);
    }

    #[tokio::test]
    async fn test_revocation_wins_over_warm_cache() {
        let (_repo, registry) = registry();
        let (identity, token) = registry
            .create_identity("anna", "Anna", false)
            .await
            .unwrap();

        // Warm the cache.
        registry.authenticate(&token).await.unwrap();

        let new_token = registry.reset_token(identity.owner_id).await.unwrap();

        // The old token was cache-positive a moment ago; it must still be
        // rejected, because the blacklist is checked before the cache.
        assert!(forbidden(registry.authenticate(&token).await));

        // The rotated credential works.
        let resolved = registry.authenticate(&new_token).await.unwrap();
        assert_eq!(resolved.owner_id, identity.owner_id);
    }

    #[tokio::test]
    async fn test_deactivate_revokes_and_soft_deletes() {
        let (repo, registry) = registry();
        let (identity, token) = registry
            .create_identity("anna", "Anna", false)
            .await
            .unwrap();
        registry.authenticate(&token).await.unwrap();

        registry.deactivate(identity.owner_id).await.unwrap();

        assert!(forbidden(registry.authenticate(&token).await));
        let stored = repo.find_by_id(identity.owner_id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_master_key_resolves_to_admin() {
        let config = AuthConfig {
            master_key: MasterKey::new("master-secret".to_string()),
            ..AuthConfig::default()
        };
        let (_repo, registry) = registry_with(config);

        // No admin yet: master key reads as any other bad credential.
        assert!(forbidden(registry.authenticate("master-secret").await));

        let (admin, _token) = registry.create_identity("admin", "Admin", true).await.unwrap();
        let resolved = registry.authenticate("master-secret").await.unwrap();
        assert_eq!(resolved.owner_id, admin.owner_id);
        assert!(resolved.is_admin);
    }

    #[tokio::test]
    async fn test_master_key_participates_in_blacklist() {
        let master = MasterKey::new("master-secret".to_string()).unwrap();
        let config = AuthConfig {
            master_key: Some(master.clone()),
            ..AuthConfig::default()
        };
        let (repo, registry) = registry_with(config);
        let cache = KeyValueCache::new(Arc::new(MemoryCacheBackend::new()));
        // Recreate the registry sharing the same cache so the blacklist is
        // visible to it.
        let registry = CredentialRegistry::new(
            repo.clone(),
            cache.clone(),
            registry.config.clone(),
        );
        registry.create_identity("admin", "Admin", true).await.unwrap();

        assert!(registry.authenticate("master-secret").await.is_ok());

        cache
            .blacklist(&master.token_hash(), Duration::from_secs(60))
            .await;
        assert!(forbidden(registry.authenticate("master-secret").await));
    }

    #[tokio::test]
    async fn test_cache_outage_falls_through_to_store() {
        let repo = Arc::new(MemoryIdentityRepository::new());
        let cache = KeyValueCache::new(Arc::new(BrokenBackend));
        let registry = CredentialRegistry::new(repo, cache, AuthConfig::default());

        let (identity, token) = registry
            .create_identity("anna", "Anna", false)
            .await
            .unwrap();

        // Blacklist check fails open, cache read fails open, the durable
        // store answers.
        let resolved = registry.authenticate(&token).await.unwrap();
        assert_eq!(resolved.owner_id, identity.owner_id);

        // Rate limiting fails open too.
        assert!(registry.rate_limit("anna").await);
    }

    #[tokio::test]
    async fn test_update_identity_invalidates_cache() {
        let (_repo, registry) = registry();
        let (mut identity, token) = registry
            .create_identity("anna", "Anna", false)
            .await
            .unwrap();
        registry.authenticate(&token).await.unwrap();

        identity.display_name = "Anna B.".to_string();
        registry.update_identity(&identity).await.unwrap();

        let resolved = registry.authenticate(&token).await.unwrap();
        assert_eq!(resolved.display_name, "Anna B.");
    }

    #[tokio::test]
    async fn test_generated_tokens_are_unique_and_urlsafe() {
        let a = CredentialRegistry::generate_token();
        let b = CredentialRegistry::generate_token();
        assert_ne!(a, b);
        assert!(a.len() >= 42);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }
}
