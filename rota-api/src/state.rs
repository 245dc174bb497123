//! Shared application state.
//!
//! Every service is constructed exactly once here and handed its
//! dependencies explicitly - no ambient globals, so each component stays
//! testable in isolation. An unreachable durable store aborts
//! initialization; a broken cache backend degrades to in-memory.

use std::sync::Arc;

use tokio::sync::watch;

use rota_mirror::{ExternalMirror, HttpSheetsTransport, SheetsTransport, SnapshotStore};
use rota_storage::{KeyValueCache, LmdbCacheBackend, MemoryCacheBackend};
use rota_vision::VisionModel;

use rota_core::RotaResult;

use crate::auth::CredentialRegistry;
use crate::config::AppConfig;
use crate::db::DbClient;
use crate::jobs::{ExtractionQueue, ExtractionWorkerDeps};
use crate::settings::ConfigStore;
use crate::shifts::ShiftService;
use crate::sync::Synchronizer;

/// Application-wide state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbClient,
    pub cache: KeyValueCache,
    pub registry: CredentialRegistry,
    pub settings: ConfigStore,
    pub shifts: ShiftService,
    pub sync: Synchronizer,
    pub extraction: ExtractionQueue,
    pub start_time: std::time::Instant,
    shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    /// Build all services. Fails only when the durable store is
    /// unreachable or the snapshot directory cannot be created.
    pub async fn initialize(
        config: AppConfig,
        model: Arc<dyn VisionModel>,
    ) -> RotaResult<Self> {
        // Durable store first: unreachable here means refuse to serve.
        let db = DbClient::connect(&config.db).await?;
        db.ensure_schema().await?;

        // Cache: LMDB when a directory is configured, memory otherwise.
        // A cache that fails to open is not fatal; the system runs
        // fail-open against an in-memory backend instead.
        let cache = match &config.cache_dir {
            Some(dir) => match LmdbCacheBackend::new(dir, config.cache_max_size_mb) {
                Ok(backend) => KeyValueCache::new(Arc::new(backend)),
                Err(e) => {
                    tracing::warn!(error = %e, "LMDB cache unavailable, using in-memory cache");
                    KeyValueCache::new(Arc::new(MemoryCacheBackend::new()))
                }
            },
            None => KeyValueCache::new(Arc::new(MemoryCacheBackend::new())),
        };

        let snapshots = SnapshotStore::new(&config.snapshot_dir)?;
        let transport: Option<Arc<dyn SheetsTransport>> = config
            .sheets
            .clone()
            .map(|cfg| Arc::new(HttpSheetsTransport::new(cfg)) as Arc<dyn SheetsTransport>);
        if transport.is_none() {
            tracing::warn!("no spreadsheet transport configured, mirror runs local-only");
        }
        let mirror = Arc::new(ExternalMirror::new(transport, snapshots));

        let registry = CredentialRegistry::new(
            Arc::new(db.clone()),
            cache.clone(),
            config.auth.clone(),
        );
        let settings = ConfigStore::new(Arc::new(db.clone()), cache.clone());
        let sync = Synchronizer::new(Arc::new(db.clone()), mirror);
        let shifts = ShiftService::new(Arc::new(db.clone()), sync.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (extraction, _worker) = ExtractionQueue::start(
            ExtractionWorkerDeps {
                settings: settings.clone(),
                model,
            },
            shutdown_rx,
        );

        Ok(Self {
            db,
            cache,
            registry,
            settings,
            shifts,
            sync,
            extraction,
            start_time: std::time::Instant::now(),
            shutdown_tx,
        })
    }

    /// Signal background workers to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
