//! ROTA Mirror - external spreadsheet adapter with local fallback.
//!
//! The spreadsheet is a best-effort, human-editable view of record data;
//! it never originates truth. Durability comes from the local append-only
//! snapshot store: every publish lands locally first, and every read path
//! falls back to the newest local snapshot when the spreadsheet service is
//! unreachable. Callers above this crate never see spreadsheet
//! unavailability as an error on the primary path.

pub mod mirror;
pub mod snapshot;
pub mod transport;

pub use mirror::{record_from_row, row_from_record, row_matches_owner, ExternalMirror, SHEET_HEADER};
pub use snapshot::SnapshotStore;
pub use transport::{HttpSheetsTransport, SheetsConfig, SheetsTransport};
