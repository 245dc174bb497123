//! The external mirror: spreadsheet first, local snapshot as the anchor.
//!
//! Every operation here has a named fallback branch. Publishes land in the
//! local snapshot store before the spreadsheet is attempted; reads prefer
//! the newest spreadsheet tab and degrade to the newest local snapshot.
//! The mirror never originates truth and never fails a caller because the
//! spreadsheet is down.

use std::sync::Arc;

use rota_core::{
    parse_shift_date, weekday_name, MirrorError, OwnerId, Provenance, RawRow, ShiftRecord,
    SnapshotRef, ValidationError,
};

use crate::snapshot::{SnapshotStore, SNAPSHOT_PREFIX};
use crate::transport::SheetsTransport;

/// Header row written to every published tab.
pub const SHEET_HEADER: [&str; 6] = ["Date", "Day", "User", "Slot 1", "Slot 2", "Source"];

/// Fallback tab when no versioned tab exists yet.
const DEFAULT_TAB: &str = "Sheet1";

/// Columns read/written per row.
const SHEET_RANGE: &str = "A:F";

// ============================================================================
// ROW CODEC
// ============================================================================

/// Encode a record as a spreadsheet row:
/// `[date, day, user, slot 1, slot 2, source]`.
pub fn row_from_record(record: &ShiftRecord, owner_name: &str) -> RawRow {
    vec![
        record.shift_date.format("%Y-%m-%d").to_string(),
        weekday_name(record.shift_date).to_string(),
        owner_name.to_string(),
        record.slot_1.clone().unwrap_or_default(),
        record.slot_2.clone().unwrap_or_default(),
        record.provenance.to_string(),
    ]
}

/// Decode a spreadsheet row back into a record.
///
/// Rows with fewer than 4 columns or an unparseable date are rejected;
/// batch callers skip them and continue. Header rows fail the date parse
/// and fall out the same way.
pub fn record_from_row(owner_id: OwnerId, row: &RawRow) -> Result<ShiftRecord, ValidationError> {
    if row.len() < 4 {
        return Err(ValidationError::RowTooShort {
            len: row.len(),
            min: 4,
        });
    }
    let shift_date = parse_shift_date(&row[0])?;

    let cell = |i: usize| -> Option<String> {
        row.get(i)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let provenance = cell(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Provenance::ExternalSync);

    Ok(ShiftRecord::new(
        owner_id,
        shift_date,
        cell(3),
        cell(4),
        None,
        provenance,
    ))
}

/// Row-to-owner match: exact date, case-insensitive name in column 2.
pub fn row_matches_owner(row: &RawRow, owner_name: &str) -> bool {
    row.len() >= 3 && row[2].to_lowercase() == owner_name.to_lowercase()
}

// ============================================================================
// MIRROR
// ============================================================================

/// Spreadsheet adapter plus local snapshot fallback.
///
/// Constructed without a transport, the mirror runs in local-only mode:
/// publishes and row updates still land in snapshots, and pushes report
/// the service as unreachable so records stay dirty until a resync.
pub struct ExternalMirror {
    transport: Option<Arc<dyn SheetsTransport>>,
    snapshots: SnapshotStore,
}

impl ExternalMirror {
    pub fn new(transport: Option<Arc<dyn SheetsTransport>>, snapshots: SnapshotStore) -> Self {
        Self {
            transport,
            snapshots,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Newest versioned tab title, by lexicographic order of titles.
    async fn latest_tab(
        &self,
        transport: &Arc<dyn SheetsTransport>,
    ) -> Result<Option<String>, MirrorError> {
        let mut versioned: Vec<String> = transport
            .list_tabs()
            .await?
            .into_iter()
            .filter(|t| t.starts_with(SNAPSHOT_PREFIX))
            .collect();
        versioned.sort();
        Ok(versioned.pop())
    }

    /// Rows of the most recent spreadsheet tab, falling back to the most
    /// recent local snapshot on any transport error.
    ///
    /// The returned rows may include a header row; the decode path skips it
    /// like any other malformed row.
    pub async fn latest_snapshot(&self) -> Vec<RawRow> {
        let Some(transport) = &self.transport else {
            return self.local_fallback("transport not configured");
        };

        let tab = match self.latest_tab(transport).await {
            Ok(Some(tab)) => tab,
            Ok(None) => DEFAULT_TAB.to_string(),
            Err(e) => return self.local_fallback(&e.to_string()),
        };

        match transport.read_range(&format!("'{tab}'!{SHEET_RANGE}")).await {
            Ok(rows) => rows,
            Err(e) => self.local_fallback(&e.to_string()),
        }
    }

    /// Named fallback branch: serve the newest local snapshot.
    fn local_fallback(&self, reason: &str) -> Vec<RawRow> {
        tracing::warn!(reason, "spreadsheet unavailable, serving local snapshot");
        match self.snapshots.latest() {
            Ok(Some((snapshot, rows))) => {
                tracing::info!(snapshot = %snapshot.name, "local snapshot fallback");
                rows
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!(error = %e, "local snapshot read failed");
                Vec::new()
            }
        }
    }

    /// Publish a full record set as a new version.
    ///
    /// The local snapshot is the durability guarantee and is written first;
    /// its failure is the only error this method returns. The spreadsheet
    /// tab is a best-effort view: its failure is logged and swallowed.
    pub async fn publish_snapshot(&self, rows: &[RawRow]) -> Result<SnapshotRef, MirrorError> {
        let snapshot = self.snapshots.publish(rows)?;

        if let Some(transport) = &self.transport {
            let title = snapshot.name.trim_end_matches(".json").to_string();
            let mut tab_rows: Vec<RawRow> =
                vec![SHEET_HEADER.iter().map(|s| s.to_string()).collect()];
            tab_rows.extend_from_slice(rows);

            let pushed = async {
                transport.add_tab(&title).await?;
                transport
                    .update_range(&format!("'{title}'!A1"), &tab_rows)
                    .await
            }
            .await;

            match pushed {
                Ok(()) => tracing::info!(tab = %title, "created and populated spreadsheet tab"),
                Err(e) => {
                    tracing::warn!(tab = %title, error = %e, "spreadsheet publish failed, local snapshot retained")
                }
            }
        }

        Ok(snapshot)
    }

    /// Rewrite the row for (date, owner) in the newest version.
    ///
    /// The local snapshot is updated first regardless of spreadsheet
    /// reachability. Returns `Ok(true)` when the spreadsheet row was
    /// rewritten, `Ok(false)` when the service was reachable but no row
    /// matched, and `Err` when the service was unreachable — in which case
    /// the update exists in the local snapshot only.
    pub async fn update_row(
        &self,
        date: &str,
        owner_name: &str,
        new_row: &RawRow,
    ) -> Result<bool, MirrorError> {
        match self.snapshots.update_latest_row(date, owner_name, new_row) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(date, owner_name, "no matching row in local snapshot"),
            Err(e) => tracing::warn!(error = %e, "local snapshot row update failed"),
        }

        let Some(transport) = &self.transport else {
            return Err(MirrorError::Unavailable {
                reason: "transport not configured".to_string(),
            });
        };

        let tab = match self.latest_tab(transport).await? {
            Some(tab) => tab,
            None => DEFAULT_TAB.to_string(),
        };

        let rows = transport.read_range(&format!("'{tab}'!{SHEET_RANGE}")).await?;
        let owner_lower = owner_name.to_lowercase();
        let matched = rows.iter().position(|row| {
            row.len() >= 3 && row[0] == date && row[2].to_lowercase() == owner_lower
        });

        match matched {
            Some(index) => {
                // A1 notation is 1-indexed.
                let line = index + 1;
                transport
                    .update_range(&format!("'{tab}'!A{line}:F{line}"), &[new_row.clone()])
                    .await?;
                tracing::info!(tab = %tab, line, "updated spreadsheet row");
                Ok(true)
            }
            None => {
                tracing::debug!(tab = %tab, date, owner_name, "no matching spreadsheet row");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory spreadsheet with a reachability switch.
    struct MockTransport {
        tabs: Mutex<BTreeMap<String, Vec<RawRow>>>,
        reachable: AtomicBool,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                tabs: Mutex::new(BTreeMap::new()),
                reachable: AtomicBool::new(true),
            }
        }

        fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), MirrorError> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(MirrorError::Unavailable {
                    reason: "mock offline".to_string(),
                })
            }
        }

        fn tab_of(range: &str) -> (String, Option<usize>) {
            let (tab, cells) = range.split_once('!').unwrap();
            let tab = tab.trim_matches('\'').to_string();
            // "A3:F3" addresses a single 1-indexed line; "A1" and "A:F"
            // address the whole tab.
            let line = cells
                .strip_prefix('A')
                .and_then(|rest| rest.split_once(':'))
                .and_then(|(n, _)| n.parse::<usize>().ok());
            (tab, line)
        }
    }

    #[async_trait]
    impl SheetsTransport for MockTransport {
        async fn list_tabs(&self) -> Result<Vec<String>, MirrorError> {
            self.check()?;
            Ok(self.tabs.lock().unwrap().keys().cloned().collect())
        }

        async fn add_tab(&self, title: &str) -> Result<(), MirrorError> {
            self.check()?;
            self.tabs
                .lock()
                .unwrap()
                .insert(title.to_string(), Vec::new());
            Ok(())
        }

        async fn read_range(&self, range: &str) -> Result<Vec<RawRow>, MirrorError> {
            self.check()?;
            let (tab, _) = Self::tab_of(range);
            Ok(self
                .tabs
                .lock()
                .unwrap()
                .get(&tab)
                .cloned()
                .unwrap_or_default())
        }

        async fn update_range(&self, range: &str, rows: &[RawRow]) -> Result<(), MirrorError> {
            self.check()?;
            let (tab, line) = Self::tab_of(range);
            let mut tabs = self.tabs.lock().unwrap();
            let entry = tabs.entry(tab).or_default();
            match line {
                Some(line) => {
                    while entry.len() < line {
                        entry.push(Vec::new());
                    }
                    entry[line - 1] = rows[0].clone();
                }
                None => *entry = rows.to_vec(),
            }
            Ok(())
        }
    }

    fn mirror_with(transport: Arc<MockTransport>) -> (tempfile::TempDir, ExternalMirror) {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path()).unwrap();
        let mirror = ExternalMirror::new(Some(transport), snapshots);
        (dir, mirror)
    }

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

    #[tokio::test]
    async fn test_publish_creates_tab_with_header() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        let rows = vec![row("2024-03-01", "Anna", "08:00-16:00")];
        let snapshot = mirror.publish_snapshot(&rows).await.unwrap();

        let tabs = transport.tabs.lock().unwrap();
        let title = snapshot.name.trim_end_matches(".json");
        let tab = tabs.get(title).unwrap();
        assert_eq!(tab.len(), 2);
        assert_eq!(tab[0][0], "Date");
        assert_eq!(tab[1], rows[0]);
    }

    #[tokio::test]
    async fn test_latest_snapshot_reads_newest_tab() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        {
            let mut tabs = transport.tabs.lock().unwrap();
            tabs.insert(
                "shifts_20240101_000000".to_string(),
                vec![row("2024-01-01", "Anna", "old")],
            );
            tabs.insert(
                "shifts_20240301_000000".to_string(),
                vec![row("2024-03-01", "Anna", "new")],
            );
            tabs.insert("Sheet1".to_string(), vec![row("2023-01-01", "Anna", "ancient")]);
        }

        let rows = mirror.latest_snapshot().await;
        assert_eq!(rows[0][3], "new");
    }

    #[tokio::test]
    async fn test_latest_snapshot_falls_back_to_sheet1() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        transport
            .tabs
            .lock()
            .unwrap()
            .insert("Sheet1".to_string(), vec![row("2024-03-01", "Anna", "only")]);

        let rows = mirror.latest_snapshot().await;
        assert_eq!(rows[0][3], "only");
    }

    #[tokio::test]
    async fn test_publish_then_offline_read_returns_local_snapshot() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        let rows = vec![
            row("2024-03-01", "Anna", "08:00-16:00"),
            row("2024-03-02", "Anna", "10:00-18:00"),
        ];
        mirror.publish_snapshot(&rows).await.unwrap();

        transport.set_reachable(false);
        let read = mirror.latest_snapshot().await;
        assert_eq!(read, rows);
    }

    #[tokio::test]
    async fn test_publish_survives_offline_transport() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));
        transport.set_reachable(false);

        let rows = vec![row("2024-03-01", "Anna", "08:00-16:00")];
        // Local snapshot succeeds even though the tab create fails.
        let snapshot = mirror.publish_snapshot(&rows).await.unwrap();
        assert!(snapshot.path.exists());
        assert!(transport.tabs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_row_rewrites_remote_row() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        let rows = vec![
            row("2024-03-01", "Anna", "08:00-16:00"),
            row("2024-03-02", "Anna", "10:00-18:00"),
        ];
        let snapshot = mirror.publish_snapshot(&rows).await.unwrap();
        let title = snapshot.name.trim_end_matches(".json").to_string();

        let updated = mirror
            .update_row("2024-03-02", "anna", &row("2024-03-02", "Anna", "12:00-20:00"))
            .await
            .unwrap();
        assert!(updated);

        let tabs = transport.tabs.lock().unwrap();
        // Header occupies line 1, so 2024-03-02 sits on line 3.
        assert_eq!(tabs.get(&title).unwrap()[2][3], "12:00-20:00");
    }

    #[tokio::test]
    async fn test_update_row_offline_updates_local_only() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));

        let rows = vec![row("2024-03-01", "Anna", "08:00-16:00")];
        mirror.publish_snapshot(&rows).await.unwrap();
        transport.set_reachable(false);

        let result = mirror
            .update_row("2024-03-01", "Anna", &row("2024-03-01", "Anna", "09:00-17:00"))
            .await;
        assert!(matches!(result, Err(MirrorError::Unavailable { .. })));

        // The local snapshot carries the update.
        let read = mirror.latest_snapshot().await;
        assert_eq!(read[0][3], "09:00-17:00");
    }

    #[tokio::test]
    async fn test_update_row_no_match_is_not_an_error() {
        let transport = Arc::new(MockTransport::new());
        let (_dir, mirror) = mirror_with(Arc::clone(&transport));
        mirror
            .publish_snapshot(&[row("2024-03-01", "Anna", "a")])
            .await
            .unwrap();

        let updated = mirror
            .update_row("2024-03-09", "Bruno", &row("2024-03-09", "Bruno", "x"))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[test]
    fn test_record_row_codec() {
        let owner = rota_core::new_owner_id();
        let record = ShiftRecord::new(
            owner,
            "2024-03-01".parse().unwrap(),
            Some("08:00-16:00".to_string()),
            None,
            Some("note stays local".to_string()),
            Provenance::Ocr,
        );

        let encoded = row_from_record(&record, "Anna");
        assert_eq!(encoded[0], "2024-03-01");
        assert_eq!(encoded[1], "Friday");
        assert_eq!(encoded[2], "Anna");
        assert_eq!(encoded[5], "ocr");

        let decoded = record_from_row(owner, &encoded).unwrap();
        assert_eq!(decoded.shift_date, record.shift_date);
        assert_eq!(decoded.slot_1, record.slot_1);
        assert_eq!(decoded.slot_2, None);
        assert_eq!(decoded.provenance, Provenance::Ocr);
    }

    #[test]
    fn test_record_from_row_rejects_malformed() {
        let owner = rota_core::new_owner_id();

        let short = vec!["2024-03-01".to_string(), "Friday".to_string()];
        assert!(matches!(
            record_from_row(owner, &short),
            Err(ValidationError::RowTooShort { .. })
        ));

        let header: RawRow = SHEET_HEADER.iter().map(|s| s.to_string()).collect();
        assert!(matches!(
            record_from_row(owner, &header),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_row_matches_owner_is_case_insensitive() {
        let r = row("2024-03-01", "Anna", "a");
        assert!(row_matches_owner(&r, "ANNA"));
        assert!(!row_matches_owner(&r, "Bruno"));
        assert!(!row_matches_owner(&["x".to_string()].to_vec(), "Anna"));
    }
}
