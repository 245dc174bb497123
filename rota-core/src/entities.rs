//! ROTA domain entities.
//!
//! Shift records, identities and settings as stored in the durable store
//! and mirrored to the external spreadsheet.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::identity::{OwnerId, Timestamp, TokenHash};

// ============================================================================
// IDENTITY
// ============================================================================

/// An authenticated account: the owner of shift records.
///
/// The plaintext bearer credential is never stored; only its SHA-256 hash.
/// At most one active identity exists per credential, and a revoked
/// credential must never resolve to an identity again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub owner_id: OwnerId,
    /// Name as it appears in the schedule table and the spreadsheet.
    pub name: String,
    pub display_name: String,
    pub token_hash: TokenHash,
    /// Soft-delete flag. Inactive identities never authenticate.
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// SETTINGS
// ============================================================================

/// A system setting. Keys are case-normalized; last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_by: Option<OwnerId>,
    pub updated_at: Timestamp,
}

// ============================================================================
// SHIFT RECORDS
// ============================================================================

/// Where a shift record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Ocr,
    Manual,
    ExternalSync,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Ocr => "ocr",
            Provenance::Manual => "manual",
            Provenance::ExternalSync => "external-sync",
        }
    }
}

impl std::str::FromStr for Provenance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocr" => Ok(Provenance::Ocr),
            "manual" => Ok(Provenance::Manual),
            "external-sync" => Ok(Provenance::ExternalSync),
            other => Err(format!("unknown provenance: {other}")),
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One shift for one owner on one calendar date.
///
/// Exactly one record exists per (owner, date): writes are upserts, never
/// blind inserts. `synced` is false from the moment of any local mutation
/// until the synchronizer confirms propagation to the mirror; the
/// synchronizer is the only writer of `synced = true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRecord {
    pub owner_id: OwnerId,
    pub shift_date: NaiveDate,
    pub slot_1: Option<String>,
    pub slot_2: Option<String>,
    pub notes: Option<String>,
    pub provenance: Provenance,
    pub synced: bool,
    /// Mutation counter, bumped by the store on every upsert of an
    /// existing (owner, date) row.
    pub version: i32,
    pub updated_at: Timestamp,
}

impl ShiftRecord {
    /// Build a freshly mutated record: dirty until the synchronizer says
    /// otherwise.
    pub fn new(
        owner_id: OwnerId,
        shift_date: NaiveDate,
        slot_1: Option<String>,
        slot_2: Option<String>,
        notes: Option<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            owner_id,
            shift_date,
            slot_1,
            slot_2,
            notes,
            provenance,
            synced: false,
            version: 1,
            updated_at: chrono::Utc::now(),
        }
    }
}

// ============================================================================
// MIRROR TYPES
// ============================================================================

/// One raw spreadsheet row, untyped.
pub type RawRow = Vec<String>;

/// Reference to an immutable local snapshot file.
///
/// Snapshot names embed a sortable timestamp; "most recent" is determined
/// by lexicographic ordering of names. Files are never mutated after
/// creation, only superseded by newer snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub name: String,
    pub path: std::path::PathBuf,
    pub created_at: Timestamp,
}

// ============================================================================
// BACKGROUND TASKS
// ============================================================================

/// Observable state of a background extraction task.
///
/// Polled via the status endpoint; polling is idempotent and abandonment
/// does not cancel the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState {
    Processing,
    Success { result: serde_json::Value },
    Failure { error: String },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Processing)
    }
}
