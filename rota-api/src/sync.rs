//! The synchronizer: sole owner of the record sync-state transition.
//!
//! Per record the lifecycle is Dirty (just upserted locally, synced false)
//! -> Pushing -> Synced, or back to Dirty on push failure. There is no
//! background retry loop: a dirty record is retried on its next write or
//! by an explicit resync. Conflicts between a local edit and a pulled
//! mirror row settle as last-write-wins by wall-clock order; slot fields
//! are never merged.

use std::sync::Arc;

use rota_core::{OwnerId, Provenance, RotaResult, ShiftRecord, SnapshotRef};
use rota_mirror::{record_from_row, row_from_record, row_matches_owner, ExternalMirror};
use rota_storage::ShiftRepository;

/// Orchestrates RecordStore <-> ExternalMirror.
#[derive(Clone)]
pub struct Synchronizer {
    repo: Arc<dyn ShiftRepository>,
    mirror: Arc<ExternalMirror>,
}

impl Synchronizer {
    pub fn new(repo: Arc<dyn ShiftRepository>, mirror: Arc<ExternalMirror>) -> Self {
        Self { repo, mirror }
    }

    pub fn mirror(&self) -> &ExternalMirror {
        &self.mirror
    }

    /// Push a freshly written record to the mirror.
    ///
    /// Called synchronously after every local upsert. On success the
    /// record is marked synced; on any failure it stays dirty and the
    /// error is logged, never propagated - a local write must succeed even
    /// with the mirror down. Returns the record's resulting sync state.
    pub async fn push_on_write(&self, record: &ShiftRecord, owner_name: &str) -> bool {
        let date = record.shift_date.format("%Y-%m-%d").to_string();
        let row = row_from_record(record, owner_name);

        match self.mirror.update_row(&date, owner_name, &row).await {
            Ok(true) => {
                match self
                    .repo
                    .mark_synced(record.owner_id, record.shift_date, true)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(date = %date, error = %e, "mirror updated but sync flag write failed");
                        false
                    }
                }
            }
            Ok(false) => {
                // Reachable, but the record has no row yet; a resync
                // publishes the full set and picks it up.
                tracing::debug!(date = %date, owner_name, "no mirror row to update, record stays dirty");
                false
            }
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "mirror push failed, record stays dirty");
                false
            }
        }
    }

    /// Seed an owner's records from the mirror when the local store has
    /// none.
    ///
    /// Rows are matched to the owner by case-insensitive name, decoded,
    /// and bulk-upserted with provenance `external-sync` and synced set
    /// immediately - they came from the mirror, so they are synced by
    /// definition. Malformed rows (short, unparseable date, header) are
    /// skipped, not fatal. Returns the number of records applied.
    pub async fn pull_if_empty(&self, owner_id: OwnerId, owner_name: &str) -> RotaResult<usize> {
        let existing = self.repo.range(owner_id, None, None).await?;
        if !existing.is_empty() {
            return Ok(0);
        }

        let rows = self.mirror.latest_snapshot().await;
        let mut applied = 0usize;

        for row in &rows {
            if !row_matches_owner(row, owner_name) {
                continue;
            }
            match record_from_row(owner_id, row) {
                Ok(mut record) => {
                    record.provenance = Provenance::ExternalSync;
                    record.synced = true;
                    self.repo.upsert(&record).await?;
                    applied += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, row = ?row, "skipping malformed mirror row");
                }
            }
        }

        if applied > 0 {
            tracing::info!(%owner_id, applied, "seeded records from mirror snapshot");
        }
        Ok(applied)
    }

    /// Publish the owner's full local record set as a new mirror version
    /// and mark everything synced.
    ///
    /// This is the repair path for records left dirty by push failures.
    pub async fn resync(&self, owner_id: OwnerId, owner_name: &str) -> RotaResult<SnapshotRef> {
        let records = self.repo.range(owner_id, None, None).await?;
        let rows: Vec<_> = records
            .iter()
            .map(|r| row_from_record(r, owner_name))
            .collect();

        let snapshot = self.mirror.publish_snapshot(&rows).await?;

        for record in &records {
            self.repo
                .mark_synced(record.owner_id, record.shift_date, true)
                .await?;
        }

        tracing::info!(%owner_id, records = records.len(), snapshot = %snapshot.name, "resync complete");
        Ok(snapshot)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockTransport;
    use super::*;
    use rota_core::new_owner_id;
    use rota_mirror::SnapshotStore;
    use rota_storage::MemoryShiftRepository;

    fn setup(
        transport: Option<Arc<MockTransport>>,
    ) -> (
        tempfile::TempDir,
        Arc<MemoryShiftRepository>,
        Synchronizer,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path()).unwrap();
        let mirror = Arc::new(ExternalMirror::new(
            transport.map(|t| t as Arc<dyn rota_mirror::SheetsTransport>),
            snapshots,
        ));
        let repo = Arc::new(MemoryShiftRepository::new());
        let sync = Synchronizer::new(repo.clone(), mirror);
        (dir, repo, sync)
    }

    fn record(owner_id: OwnerId, date: &str, slot: &str) -> ShiftRecord {
        ShiftRecord::new(
            owner_id,
            date.parse().unwrap(),
            Some(slot.to_string()),
            None,
            None,
            Provenance::Manual,
        )
    }

    fn raw_row(date: &str, user: &str, slot: &str) -> Vec<String> {
        vec![
            date.to_string(),
            "Friday".to_string(),
            user.to_string(),
            slot.to_string(),
            String::new(),
            "manual".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_push_failure_leaves_record_dirty() {
        // No transport configured: every push fails.
        let (_dir, repo, sync) = setup(None);
        let owner = new_owner_id();
        let r = record(owner, "2024-03-01", "08:00-16:00");
        repo.upsert(&r).await.unwrap();

        let synced = sync.push_on_write(&r, "Anna").await;
        assert!(!synced);

        // The record is still retrievable with its values, just dirty.
        let stored = repo
            .find(owner, "2024-03-01".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.slot_1.as_deref(), Some("08:00-16:00"));
        assert!(!stored.synced);
    }

    #[tokio::test]
    async fn test_push_marks_synced_when_mirror_row_updates() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, repo, sync) = setup(Some(Arc::clone(&transport)));
        let owner = new_owner_id();

        let r = record(owner, "2024-03-01", "08:00-16:00");
        repo.upsert(&r).await.unwrap();
        // Publish so the mirror has a row to update.
        sync.resync(owner, "Anna").await.unwrap();

        let edited = record(owner, "2024-03-01", "10:00-18:00");
        repo.upsert(&edited).await.unwrap();
        let synced = sync.push_on_write(&edited, "Anna").await;
        assert!(synced);

        let stored = repo
            .find(owner, "2024-03-01".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.synced);
    }

    #[tokio::test]
    async fn test_push_without_mirror_row_stays_dirty() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, repo, sync) = setup(Some(transport));
        let owner = new_owner_id();

        let r = record(owner, "2024-03-01", "08:00-16:00");
        repo.upsert(&r).await.unwrap();

        // Mirror reachable but empty: nothing to rewrite.
        assert!(!sync.push_on_write(&r, "Anna").await);
        assert!(!repo
            .find(owner, "2024-03-01".parse().unwrap())
            .await
            .unwrap()
            .unwrap()
            .synced);
    }

    #[tokio::test]
    async fn test_pull_if_empty_seeds_well_formed_rows() {
        let transport = Arc::new(MockTransport::new());
        transport.seed_tab(
            "shifts_20240301_000000",
            vec![
                // Header: skipped by the date parse.
                vec!["Date".into(), "Day".into(), "User".into(), "Slot 1".into()],
                raw_row("2024-03-01", "Anna", "08:00-16:00"),
                raw_row("2024-03-02", "Anna", "10:00-18:00"),
                // Different owner: filtered out.
                raw_row("2024-03-01", "Bruno", "12:00-20:00"),
                // Malformed date: skipped, not fatal.
                raw_row("03/03/2024", "Anna", "14:00-22:00"),
                // Too short: skipped.
                vec!["2024-03-04".into(), "Monday".into(), "Anna".into()],
            ],
        );
        let (_dir, repo, sync) = setup(Some(transport));
        let owner = new_owner_id();

        let applied = sync.pull_if_empty(owner, "anna").await.unwrap();
        assert_eq!(applied, 2);

        let records = repo.range(owner, None, None).await.unwrap();
        assert_eq!(records.len(), 2);
        for r in &records {
            assert!(r.synced);
            assert_eq!(r.provenance, Provenance::ExternalSync);
        }
    }

    #[tokio::test]
    async fn test_pull_if_empty_is_a_no_op_with_local_records() {
        let transport = Arc::new(MockTransport::new());
        transport.seed_tab(
            "shifts_20240301_000000",
            vec![raw_row("2024-03-01", "Anna", "08:00-16:00")],
        );
        let (_dir, repo, sync) = setup(Some(transport));
        let owner = new_owner_id();
        repo.upsert(&record(owner, "2024-06-01", "09:00-17:00"))
            .await
            .unwrap();

        assert_eq!(sync.pull_if_empty(owner, "Anna").await.unwrap(), 0);
        assert_eq!(repo.range(owner, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pull_falls_back_to_local_snapshot_when_offline() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, repo, sync) = setup(Some(Arc::clone(&transport)));
        let owner = new_owner_id();

        // Publish a snapshot (locally durable), then lose the service and
        // the local records.
        repo.upsert(&record(owner, "2024-03-01", "08:00-16:00"))
            .await
            .unwrap();
        sync.resync(owner, "Anna").await.unwrap();
        repo.delete(owner, "2024-03-01".parse().unwrap())
            .await
            .unwrap();
        transport.set_reachable(false);

        let applied = sync.pull_if_empty(owner, "Anna").await.unwrap();
        assert_eq!(applied, 1);
        let records = repo.range(owner, None, None).await.unwrap();
        assert_eq!(records[0].slot_1.as_deref(), Some("08:00-16:00"));
    }

    #[tokio::test]
    async fn test_resync_publishes_and_marks_synced() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, repo, sync) = setup(Some(Arc::clone(&transport)));
        let owner = new_owner_id();

        repo.upsert(&record(owner, "2024-03-01", "08:00-16:00"))
            .await
            .unwrap();
        repo.upsert(&record(owner, "2024-03-02", "10:00-18:00"))
            .await
            .unwrap();

        let snapshot = sync.resync(owner, "Anna").await.unwrap();
        assert!(snapshot.name.starts_with("shifts_"));

        for r in repo.range(owner, None, None).await.unwrap() {
            assert!(r.synced);
        }

        // The tab carries header + both rows.
        let tabs = transport.tabs.lock().unwrap();
        let title = snapshot.name.trim_end_matches(".json");
        assert_eq!(tabs.get(title).unwrap().len(), 3);
    }
}
