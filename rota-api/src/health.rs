//! Health probe.

use serde::Serialize;

use crate::state::AppState;

/// Point-in-time health of the serving process.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Whether the cache backend answered a ping. A dead cache degrades
    /// the system (fail-open everywhere) but does not make it unhealthy.
    pub cache_ok: bool,
    /// Current database pool size.
    pub db_pool_size: usize,
    pub uptime_secs: u64,
}

/// Probe the shared state.
pub async fn health_check(state: &AppState) -> Health {
    Health {
        cache_ok: state.cache.ping().await,
        db_pool_size: state.db.pool_size(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    }
}
