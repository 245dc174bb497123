//! ROTA Service Layer
//!
//! The orchestration tier between transport adapters (HTTP, bot - out of
//! scope here) and the storage/mirror crates:
//!
//! - [`auth`]: credential registry with blacklist-first authentication
//! - [`settings`]: cache-aside system settings and prompt templating
//! - [`shifts`]: shift record service with partial-failure-tolerant batches
//! - [`sync`]: the synchronizer owning the record sync-state transition
//! - [`jobs`]: background extraction worker with a polled status registry
//! - [`db`]: Postgres implementations of the repository traits
//! - [`state`]: process-scoped services constructed once at startup
//!
//! Nothing in here is looked up via ambient global state: every component
//! receives its dependencies explicitly at construction.

pub mod auth;
pub mod config;
pub mod db;
pub mod health;
pub mod jobs;
pub mod settings;
pub mod shifts;
pub mod state;
pub mod sync;
pub mod telemetry;

pub use auth::{AuthConfig, CredentialRegistry, MasterKey};
pub use config::AppConfig;
pub use db::{DbClient, DbConfig};
pub use health::{health_check, Health};
pub use jobs::{ExtractionQueue, ExtractionTask, ExtractionWorkerDeps};
pub use settings::ConfigStore;
pub use shifts::{BulkShiftItem, ShiftService};
pub use state::AppState;
pub use sync::Synchronizer;
