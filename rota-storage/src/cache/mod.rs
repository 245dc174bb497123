//! Cache layer with an explicit fail-open contract.
//!
//! The cache is a bounded-staleness accelerator, never a source of truth.
//! Backends (LMDB, in-memory) may fail at any time; [`KeyValueCache`]
//! absorbs every backend error into a miss or a no-op and logs a structured
//! event, so callers always fall through to the durable store.
//!
//! # Invalidation ownership
//!
//! Keys are namespaced per owning component (`user:`, `setting:`,
//! `blacklist:`, `ratelimit:`). Only the component that writes an entity
//! may invalidate its keys, synchronously after every durable write and
//! before the write is reported successful. Cross-component invalidation
//! is forbidden.

pub mod kv;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use kv::KeyValueCache;
pub use lmdb_backend::LmdbCacheBackend;
pub use memory::MemoryCacheBackend;
pub use traits::{CacheBackend, CacheError, CacheStats};
