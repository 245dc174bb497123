//! ROTA Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types and small pure helpers - no I/O,
//! no business logic.

pub mod entities;
pub mod error;
pub mod identity;
pub mod time;

pub use entities::{
    Identity, Provenance, RawRow, Setting, ShiftRecord, SnapshotRef, TaskState,
};
pub use error::{
    AuthError, ConfigError, EntityKind, MirrorError, RotaError, RotaResult, StorageError,
    ValidationError, VisionError,
};
pub use identity::{
    hash_token, new_owner_id, new_task_id, OwnerId, TaskId, Timestamp, TokenHash,
};
pub use time::{parse_shift_date, slot_format_is_valid, week_bounds, weekday_name};
