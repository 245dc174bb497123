//! In-memory repository implementations.
//!
//! Back the test suites across the workspace; semantics match the Postgres
//! implementations in `rota-api`, including upsert-in-place and ordering.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rota_core::{
    EntityKind, Identity, OwnerId, RotaResult, Setting, ShiftRecord, StorageError,
};
use tokio::sync::RwLock;

use super::{IdentityRepository, SettingsRepository, ShiftRepository};

// ============================================================================
// IDENTITIES
// ============================================================================

#[derive(Default)]
pub struct MemoryIdentityRepository {
    identities: RwLock<HashMap<OwnerId, Identity>>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn find_by_token_hash(&self, token_hash: &str) -> RotaResult<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .find(|i| i.token_hash == token_hash && i.is_active)
            .cloned())
    }

    async fn find_by_id(&self, owner_id: OwnerId) -> RotaResult<Option<Identity>> {
        Ok(self.identities.read().await.get(&owner_id).cloned())
    }

    async fn list_active(&self) -> RotaResult<Vec<Identity>> {
        let identities = self.identities.read().await;
        let mut active: Vec<Identity> =
            identities.values().filter(|i| i.is_active).cloned().collect();
        active.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(active)
    }

    async fn find_admin(&self) -> RotaResult<Option<Identity>> {
        let identities = self.identities.read().await;
        Ok(identities
            .values()
            .find(|i| i.is_admin && i.is_active)
            .cloned())
    }

    async fn insert(&self, identity: &Identity) -> RotaResult<()> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(&identity.owner_id) {
            return Err(StorageError::InsertFailed {
                kind: EntityKind::Identity,
                reason: format!("duplicate owner_id {}", identity.owner_id),
            }
            .into());
        }
        identities.insert(identity.owner_id, identity.clone());
        Ok(())
    }

    async fn update(&self, identity: &Identity) -> RotaResult<()> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&identity.owner_id) {
            Some(existing) => {
                *existing = identity.clone();
                existing.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: identity.owner_id.to_string(),
            }
            .into()),
        }
    }

    async fn rotate_token(&self, owner_id: OwnerId, new_hash: &str) -> RotaResult<()> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&owner_id) {
            Some(identity) => {
                identity.token_hash = new_hash.to_string();
                identity.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: owner_id.to_string(),
            }
            .into()),
        }
    }

    async fn deactivate(&self, owner_id: OwnerId) -> RotaResult<()> {
        let mut identities = self.identities.write().await;
        match identities.get_mut(&owner_id) {
            Some(identity) => {
                identity.is_active = false;
                identity.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: owner_id.to_string(),
            }
            .into()),
        }
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Default)]
pub struct MemorySettingsRepository {
    settings: RwLock<HashMap<String, Setting>>,
}

impl MemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for MemorySettingsRepository {
    async fn get(&self, key: &str) -> RotaResult<Option<Setting>> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &str,
        value: &str,
        updated_by: Option<OwnerId>,
    ) -> RotaResult<Setting> {
        let setting = Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_by,
            updated_at: chrono::Utc::now(),
        };
        self.settings
            .write()
            .await
            .insert(key.to_string(), setting.clone());
        Ok(setting)
    }

    async fn delete(&self, key: &str) -> RotaResult<bool> {
        Ok(self.settings.write().await.remove(key).is_some())
    }

    async fn all(&self) -> RotaResult<Vec<Setting>> {
        let settings = self.settings.read().await;
        let mut all: Vec<Setting> = settings.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }
}

// ============================================================================
// SHIFT RECORDS
// ============================================================================

#[derive(Default)]
pub struct MemoryShiftRepository {
    shifts: RwLock<HashMap<(OwnerId, NaiveDate), ShiftRecord>>,
}

impl MemoryShiftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.shifts.read().await.len()
    }
}

#[async_trait]
impl ShiftRepository for MemoryShiftRepository {
    async fn upsert(&self, record: &ShiftRecord) -> RotaResult<ShiftRecord> {
        let mut shifts = self.shifts.write().await;
        let mut stored = record.clone();
        stored.updated_at = chrono::Utc::now();
        stored.version = match shifts.get(&(record.owner_id, record.shift_date)) {
            Some(existing) => existing.version + 1,
            None => 1,
        };
        shifts.insert((record.owner_id, record.shift_date), stored.clone());
        Ok(stored)
    }

    async fn find(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<Option<ShiftRecord>> {
        Ok(self.shifts.read().await.get(&(owner_id, date)).cloned())
    }

    async fn range(
        &self,
        owner_id: OwnerId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> RotaResult<Vec<ShiftRecord>> {
        let shifts = self.shifts.read().await;
        let mut matching: Vec<ShiftRecord> = shifts
            .values()
            .filter(|r| r.owner_id == owner_id)
            .filter(|r| start.is_none_or(|s| r.shift_date >= s))
            .filter(|r| end.is_none_or(|e| r.shift_date <= e))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.shift_date);
        Ok(matching)
    }

    async fn delete(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<bool> {
        Ok(self
            .shifts
            .write()
            .await
            .remove(&(owner_id, date))
            .is_some())
    }

    async fn mark_synced(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
        synced: bool,
    ) -> RotaResult<()> {
        let mut shifts = self.shifts.write().await;
        match shifts.get_mut(&(owner_id, date)) {
            Some(record) => {
                record.synced = synced;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: EntityKind::Shift,
                key: format!("{owner_id}/{date}"),
            }
            .into()),
        }
    }
}
