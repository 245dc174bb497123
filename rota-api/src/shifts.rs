//! Shift record service.
//!
//! The single write path for shift records: every upsert clears the sync
//! flag, lands in the durable store, and is then handed to the
//! synchronizer. The mirror push outcome is reflected in the returned
//! record's `synced` field and never in an error - a local write succeeds
//! even with the mirror down.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;

use rota_core::{
    parse_shift_date, slot_format_is_valid, week_bounds, Identity, OwnerId, Provenance,
    RotaResult, ShiftRecord,
};
use rota_storage::ShiftRepository;

use crate::sync::Synchronizer;

/// One item of a bulk save, as produced by the extraction pipeline.
///
/// The extraction output uses the upstream field name `data` for the
/// date; both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkShiftItem {
    #[serde(alias = "data")]
    pub date: String,
    #[serde(default)]
    pub slot_1: Option<String>,
    #[serde(default)]
    pub slot_2: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Service over the shift repository plus the synchronizer.
#[derive(Clone)]
pub struct ShiftService {
    repo: Arc<dyn ShiftRepository>,
    sync: Synchronizer,
}

impl ShiftService {
    pub fn new(repo: Arc<dyn ShiftRepository>, sync: Synchronizer) -> Self {
        Self { repo, sync }
    }

    /// Upsert one record for (owner, date).
    ///
    /// Always clears the sync flag before writing; the synchronizer then
    /// pushes and the returned record carries the resulting sync state.
    pub async fn upsert(
        &self,
        owner: &Identity,
        date: NaiveDate,
        slot_1: Option<String>,
        slot_2: Option<String>,
        notes: Option<String>,
        provenance: Provenance,
    ) -> RotaResult<ShiftRecord> {
        let slot_1 = normalize_slot(slot_1);
        let slot_2 = normalize_slot(slot_2);

        for slot in [&slot_1, &slot_2].into_iter().flatten() {
            if !slot_format_is_valid(slot) {
                // Free-text slots (rest markers etc.) are legitimate;
                // surface them for data-quality follow-up only.
                tracing::debug!(%date, slot, "slot does not match HH:MM-HH:MM");
            }
        }

        let record = ShiftRecord::new(owner.owner_id, date, slot_1, slot_2, notes, provenance);
        let mut stored = self.repo.upsert(&record).await?;

        stored.synced = self.sync.push_on_write(&stored, &owner.name).await;
        Ok(stored)
    }

    /// Apply a batch of items, continuing past per-item failures.
    ///
    /// A malformed date in one item must not abort the batch: the item is
    /// logged and skipped, and only the successfully saved subset is
    /// returned.
    pub async fn bulk_upsert(
        &self,
        owner: &Identity,
        items: &[BulkShiftItem],
        provenance: Provenance,
    ) -> Vec<ShiftRecord> {
        let mut saved = Vec::with_capacity(items.len());

        for item in items {
            let date = match parse_shift_date(&item.date) {
                Ok(date) => date,
                Err(e) => {
                    tracing::warn!(error = %e, item = ?item, "skipping batch item");
                    continue;
                }
            };

            match self
                .upsert(
                    owner,
                    date,
                    item.slot_1.clone(),
                    item.slot_2.clone(),
                    item.notes.clone(),
                    provenance,
                )
                .await
            {
                Ok(record) => saved.push(record),
                Err(e) => {
                    tracing::warn!(error = %e, date = %date, "batch item failed to save");
                }
            }
        }

        tracing::info!(
            owner_id = %owner.owner_id,
            saved = saved.len(),
            total = items.len(),
            "bulk upsert applied"
        );
        saved
    }

    /// Records in `[start, end]`, ordered by date ascending.
    pub async fn range(
        &self,
        owner_id: OwnerId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> RotaResult<Vec<ShiftRecord>> {
        self.repo.range(owner_id, start, end).await
    }

    /// Monday-to-Sunday records for the week containing today, from the
    /// local clock.
    pub async fn current_week(&self, owner_id: OwnerId) -> RotaResult<Vec<ShiftRecord>> {
        let today = chrono::Local::now().date_naive();
        let (monday, sunday) = week_bounds(today);
        self.repo.range(owner_id, Some(monday), Some(sunday)).await
    }

    pub async fn get(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
    ) -> RotaResult<Option<ShiftRecord>> {
        self.repo.find(owner_id, date).await
    }

    /// Delete a record. Returns whether one existed.
    pub async fn delete(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<bool> {
        self.repo.delete(owner_id, date).await
    }

    /// All records for an owner, seeding from the mirror first when the
    /// local store has none.
    pub async fn list_or_pull(&self, owner: &Identity) -> RotaResult<Vec<ShiftRecord>> {
        let records = self.repo.range(owner.owner_id, None, None).await?;
        if !records.is_empty() {
            return Ok(records);
        }

        let pulled = self.sync.pull_if_empty(owner.owner_id, &owner.name).await?;
        if pulled > 0 {
            tracing::info!(owner_id = %owner.owner_id, pulled, "local store seeded from mirror");
        }
        self.repo.range(owner.owner_id, None, None).await
    }
}

fn normalize_slot(slot: Option<String>) -> Option<String> {
    slot.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
