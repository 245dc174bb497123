//! Local append-only versioned snapshots.
//!
//! One JSON file per snapshot, named `shifts_<YYYYMMDD_HHMMSS>.json` so
//! that lexicographic ordering of names is creation order. "Most recent"
//! is the newest-by-name file; this tie-break is deliberate and relied on
//! by the mirror fallback path. Published files are never rewritten except
//! by [`SnapshotStore::update_latest_row`], which edits a single row of the
//! newest snapshot in place (the local half of the mirror's `update_row`).

use std::fs;
use std::path::{Path, PathBuf};

use rota_core::{MirrorError, RawRow, SnapshotRef};

/// Filename prefix shared with the spreadsheet tab naming scheme.
pub const SNAPSHOT_PREFIX: &str = "shifts_";

/// Directory of timestamp-named snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) a snapshot directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, MirrorError> {
        fs::create_dir_all(&dir).map_err(|e| MirrorError::SnapshotIo {
            reason: e.to_string(),
        })?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a new immutable snapshot and return its reference.
    ///
    /// Never overwrites: a same-second publish gets a numeric suffix, which
    /// still sorts after the unsuffixed name.
    pub fn publish(&self, rows: &[RawRow]) -> Result<SnapshotRef, MirrorError> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let mut name = format!("{SNAPSHOT_PREFIX}{stamp}.json");
        let mut n = 0;
        while self.dir.join(&name).exists() {
            n += 1;
            name = format!("{SNAPSHOT_PREFIX}{stamp}_{n}.json");
        }

        let path = self.dir.join(&name);
        let payload =
            serde_json::to_vec_pretty(rows).map_err(|e| MirrorError::SnapshotIo {
                reason: e.to_string(),
            })?;
        fs::write(&path, payload).map_err(|e| MirrorError::SnapshotIo {
            reason: e.to_string(),
        })?;

        tracing::info!(snapshot = %name, rows = rows.len(), "versioned local snapshot saved");
        Ok(SnapshotRef {
            name,
            path,
            created_at: chrono::Utc::now(),
        })
    }

    /// Snapshot filenames, ascending (oldest first).
    pub fn list(&self) -> Result<Vec<String>, MirrorError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| MirrorError::SnapshotIo {
            reason: e.to_string(),
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with(SNAPSHOT_PREFIX) && n.ends_with(".json"))
            .collect();
        names.sort();
        Ok(names)
    }

    /// The most recent snapshot and its rows; `None` when the directory is
    /// empty. A corrupt newest file reads as `None` rather than failing the
    /// fallback path.
    pub fn latest(&self) -> Result<Option<(SnapshotRef, Vec<RawRow>)>, MirrorError> {
        let mut names = self.list()?;
        let Some(name) = names.pop() else {
            return Ok(None);
        };
        let path = self.dir.join(&name);

        let raw = fs::read(&path).map_err(|e| MirrorError::SnapshotIo {
            reason: e.to_string(),
        })?;
        match serde_json::from_slice::<Vec<RawRow>>(&raw) {
            Ok(rows) => Ok(Some((
                SnapshotRef {
                    name,
                    path,
                    created_at: chrono::Utc::now(),
                },
                rows,
            ))),
            Err(e) => {
                tracing::warn!(snapshot = %name, error = %e, "corrupt snapshot, ignoring");
                Ok(None)
            }
        }
    }

    /// Rewrite one row of the newest snapshot in place.
    ///
    /// Matches on (date, case-insensitive owner name) in columns 0 and 2
    /// and stops at the first hit; under a display-name collision the first
    /// matching row is updated, mirroring the upstream behavior. Returns
    /// whether a row was rewritten.
    pub fn update_latest_row(
        &self,
        date: &str,
        owner_name: &str,
        new_row: &RawRow,
    ) -> Result<bool, MirrorError> {
        let Some((snapshot, mut rows)) = self.latest()? else {
            return Ok(false);
        };

        let owner_lower = owner_name.to_lowercase();
        let Some(index) = rows.iter().position(|row| {
            row.len() >= 3 && row[0] == date && row[2].to_lowercase() == owner_lower
        }) else {
            return Ok(false);
        };

        rows[index] = new_row.clone();
        let payload =
            serde_json::to_vec_pretty(&rows).map_err(|e| MirrorError::SnapshotIo {
                reason: e.to_string(),
            })?;
        fs::write(&snapshot.path, payload).map_err(|e| MirrorError::SnapshotIo {
            reason: e.to_string(),
        })?;

        tracing::info!(snapshot = %snapshot.name, row = index, "updated row in latest local snapshot");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, user: &str, slot: &str) -> RawRow {
        vec![
            date.to_string(),
            "Friday".to_string(),
            user.to_string(),
            slot.to_string(),
            String::new(),
            "manual".to_string(),
        ]
    }

    #[test]
    fn test_publish_then_latest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        let rows = vec![row("2024-03-01", "Anna", "08:00-16:00")];
        let published = store.publish(&rows).unwrap();
        assert!(published.name.starts_with(SNAPSHOT_PREFIX));

        let (latest, read_rows) = store.latest().unwrap().unwrap();
        assert_eq!(latest.name, published.name);
        assert_eq!(read_rows, rows);
    }

    #[test]
    fn test_newest_by_name_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();

        // Same-second publishes must not overwrite each other, and the
        // later one must still be the latest.
        store.publish(&[row("2024-03-01", "Anna", "a")]).unwrap();
        store.publish(&[row("2024-03-01", "Anna", "b")]).unwrap();
        let third = store.publish(&[row("2024-03-01", "Anna", "c")]).unwrap();

        assert_eq!(store.list().unwrap().len(), 3);
        let (latest, rows) = store.latest().unwrap().unwrap();
        assert_eq!(latest.name, third.name);
        assert_eq!(rows[0][3], "c");
    }

    #[test]
    fn test_empty_dir_has_no_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        assert!(store.latest().unwrap().is_none());
        assert!(!store
            .update_latest_row("2024-03-01", "Anna", &row("2024-03-01", "Anna", "x"))
            .unwrap());
    }

    #[test]
    fn test_update_latest_row_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        store
            .publish(&[
                row("2024-03-01", "Anna", "08:00-16:00"),
                row("2024-03-02", "Anna", "10:00-18:00"),
            ])
            .unwrap();

        let updated = store
            .update_latest_row("2024-03-02", "ANNA", &row("2024-03-02", "Anna", "12:00-20:00"))
            .unwrap();
        assert!(updated);

        let (_, rows) = store.latest().unwrap().unwrap();
        assert_eq!(rows[1][3], "12:00-20:00");
        // Unmatched date leaves the snapshot alone.
        assert!(!store
            .update_latest_row("2024-03-09", "Anna", &row("2024-03-09", "Anna", "x"))
            .unwrap());
    }

    #[test]
    fn test_corrupt_latest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("shifts_20990101_000000.json"), b"{ not json").unwrap();
        assert!(store.latest().unwrap().is_none());
    }
}
