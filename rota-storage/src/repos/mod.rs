//! Repository traits for the durable store.
//!
//! The service layer depends on these traits only; the Postgres
//! implementations live in `rota-api`, the in-memory implementations here
//! back the test suites.

use async_trait::async_trait;
use chrono::NaiveDate;
use rota_core::{Identity, OwnerId, RotaResult, Setting, ShiftRecord};

pub mod memory;

pub use memory::{MemoryIdentityRepository, MemorySettingsRepository, MemoryShiftRepository};

/// Identity persistence.
///
/// Lookups by token hash only ever return active identities; a deactivated
/// identity is invisible to authentication.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_token_hash(&self, token_hash: &str) -> RotaResult<Option<Identity>>;

    async fn find_by_id(&self, owner_id: OwnerId) -> RotaResult<Option<Identity>>;

    /// Active identities, ordered by display name.
    async fn list_active(&self) -> RotaResult<Vec<Identity>>;

    /// The distinguished administrative identity for the master-key path.
    async fn find_admin(&self) -> RotaResult<Option<Identity>>;

    async fn insert(&self, identity: &Identity) -> RotaResult<()>;

    async fn update(&self, identity: &Identity) -> RotaResult<()>;

    /// Atomically assign a new credential hash to an identity.
    ///
    /// Part of the reset flow; the caller blacklists the old hash and
    /// invalidates the cache entry before calling this.
    async fn rotate_token(&self, owner_id: OwnerId, new_hash: &str) -> RotaResult<()>;

    /// Soft delete: the identity stays on record but never authenticates.
    async fn deactivate(&self, owner_id: OwnerId) -> RotaResult<()>;
}

/// System settings persistence. Keys are stored case-normalized.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> RotaResult<Option<Setting>>;

    /// Update-if-exists else insert. Last write wins.
    async fn upsert(&self, key: &str, value: &str, updated_by: Option<OwnerId>)
        -> RotaResult<Setting>;

    async fn delete(&self, key: &str) -> RotaResult<bool>;

    async fn all(&self) -> RotaResult<Vec<Setting>>;
}

/// Shift record persistence.
///
/// The store serializes concurrent upserts to the same (owner, date) key:
/// two racing writers settle as last-commit-wins with exactly one row
/// remaining.
#[async_trait]
pub trait ShiftRepository: Send + Sync {
    /// Single-row upsert keyed by (owner, date). Returns the stored record.
    async fn upsert(&self, record: &ShiftRecord) -> RotaResult<ShiftRecord>;

    async fn find(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<Option<ShiftRecord>>;

    /// Records in `[start, end]` (either bound optional), ordered by date
    /// ascending.
    async fn range(
        &self,
        owner_id: OwnerId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> RotaResult<Vec<ShiftRecord>>;

    async fn delete(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<bool>;

    /// Flip the sync-state flag. The synchronizer is the only caller that
    /// ever passes `true`.
    async fn mark_synced(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
        synced: bool,
    ) -> RotaResult<()>;
}
