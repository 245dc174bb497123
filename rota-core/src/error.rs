//! Error types for ROTA operations

use thiserror::Error;

/// Entity discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Identity,
    Setting,
    Shift,
    Snapshot,
}

/// Authentication errors.
///
/// A single uniform variant on purpose: missing, unknown, inactive and
/// revoked credentials are indistinguishable to the caller, so a probe
/// cannot learn which check rejected it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("forbidden")]
    Forbidden,
}

/// Durable-store errors.
///
/// These are the only errors that surface to callers on the primary write
/// path: if the store rejects a write, the caller must know the operation
/// did not happen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {kind:?} with key {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("Insert failed for {kind:?}: {reason}")]
    InsertFailed { kind: EntityKind, reason: String },

    #[error("Update failed for {kind:?} with key {key}: {reason}")]
    UpdateFailed {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    /// Raised when the store cannot be reached at startup. Fatal: the
    /// process refuses to serve without its durable store.
    #[error("Durable store unreachable: {reason}")]
    ConnectionFailed { reason: String },
}

/// Validation errors.
///
/// In batch operations a validation failure applies to one item only: the
/// item is logged and skipped, the rest of the batch proceeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Unparseable date: {value}")]
    InvalidDate { value: String },

    #[error("Row too short: {len} columns, need at least {min}")]
    RowTooShort { len: usize, min: usize },
}

/// Mirror (spreadsheet) errors.
///
/// Absorbed at the component boundary and converted to the local-snapshot
/// fallback path; they never fail the caller of a local write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Spreadsheet service unreachable: {reason}")]
    Unavailable { reason: String },

    #[error("Snapshot I/O failed: {reason}")]
    SnapshotIo { reason: String },

    #[error("No snapshot available")]
    NoSnapshot,
}

/// Model provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VisionError {
    #[error("No model provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all ROTA errors.
#[derive(Debug, Clone, Error)]
pub enum RotaError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for ROTA operations.
pub type RotaResult<T> = Result<T, RotaError>;

// =============================================================================
// TESTS
// =============================================================================
