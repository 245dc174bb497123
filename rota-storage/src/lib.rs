//! ROTA Storage - Cache layer and repository traits.
//!
//! Two halves:
//!
//! - [`cache`]: a TTL key/value cache with a strict fail-open contract.
//!   Any backend error is treated as a cache miss; the cache is never the
//!   only source of an answer, so callers must always have a path to the
//!   durable store.
//! - [`repos`]: async repository traits for identities, settings and shift
//!   records, plus in-memory implementations used by tests. The Postgres
//!   implementations live in `rota-api`.

pub mod cache;
pub mod repos;

pub use cache::{
    CacheBackend, CacheError, CacheStats, KeyValueCache, LmdbCacheBackend, MemoryCacheBackend,
};
pub use repos::{
    IdentityRepository, MemoryIdentityRepository, MemorySettingsRepository, MemoryShiftRepository,
    SettingsRepository, ShiftRepository,
};
