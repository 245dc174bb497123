//! Application configuration.
//!
//! Loaded from environment variables with development defaults. Each
//! sub-config owns its own variables; this module only composes them.

use std::path::PathBuf;

use rota_mirror::SheetsConfig;

use crate::auth::AuthConfig;
use crate::db::DbConfig;

/// Top-level configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub auth: AuthConfig,

    /// Directory for the LMDB cache. `None` keeps the cache in memory.
    pub cache_dir: Option<PathBuf>,

    /// Maximum LMDB cache size in megabytes.
    pub cache_max_size_mb: usize,

    /// Directory for local versioned snapshots, the mirror's durability
    /// buffer.
    pub snapshot_dir: PathBuf,

    /// Spreadsheet transport config. `None` runs the mirror in
    /// local-snapshot-only mode.
    pub sheets: Option<SheetsConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            auth: AuthConfig::default(),
            cache_dir: None,
            cache_max_size_mb: 128,
            snapshot_dir: PathBuf::from("temp/backups"),
            sheets: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `ROTA_CACHE_DIR`: LMDB cache directory (unset = in-memory cache)
    /// - `ROTA_CACHE_SIZE_MB`: LMDB map size (default: 128)
    /// - `ROTA_SNAPSHOT_DIR`: snapshot directory (default: temp/backups)
    /// - plus everything `DbConfig`, `AuthConfig` and `SheetsConfig` read.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db: DbConfig::from_env(),
            auth: AuthConfig::from_env(),
            cache_dir: std::env::var("ROTA_CACHE_DIR").ok().map(PathBuf::from),
            cache_max_size_mb: std::env::var("ROTA_CACHE_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_max_size_mb),
            snapshot_dir: std::env::var("ROTA_SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
            sheets: SheetsConfig::from_env(),
        }
    }
}
