//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres, plus the Postgres
//! implementations of the repository traits from `rota-storage`. Per-key
//! write serialization relies on row-level upserts: concurrent writes to
//! the same (owner, date) settle as last-commit-wins with exactly one row
//! remaining.
//!
//! A store that cannot be reached at startup is fatal: the process
//! refuses to serve without its durable store.

use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

use rota_core::{
    EntityKind, Identity, OwnerId, Provenance, RotaError, RotaResult, Setting, ShiftRecord,
    StorageError,
};
use rota_storage::{IdentityRepository, SettingsRepository, ShiftRepository};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_size: usize,
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "rota".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("ROTA_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("ROTA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("ROTA_DB_NAME").unwrap_or_else(|_| "rota".to_string()),
            user: std::env::var("ROTA_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("ROTA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ROTA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("ROTA_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> RotaResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| connection_failed(format!("failed to create pool: {e}")))
    }
}

fn connection_failed(reason: String) -> RotaError {
    StorageError::ConnectionFailed { reason }.into()
}

fn query_failed(e: impl std::fmt::Display) -> RotaError {
    StorageError::QueryFailed {
        reason: e.to_string(),
    }
    .into()
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Database client wrapping a connection pool.
///
/// Implements the three repository traits; the service layer holds it as
/// `Arc<dyn ...Repository>` per trait.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Connect and verify the store is reachable. Startup failure here is
    /// fatal by policy: callers refuse to serve.
    pub async fn connect(config: &DbConfig) -> RotaResult<Self> {
        let pool = config.create_pool()?;

        let conn = pool
            .get()
            .await
            .map_err(|e| connection_failed(format!("durable store unreachable: {e}")))?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| connection_failed(format!("durable store probe failed: {e}")))?;

        tracing::info!(host = %config.host, dbname = %config.dbname, "database pool ready");
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet.
    pub async fn ensure_schema(&self) -> RotaResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS owners (
                owner_id     UUID PRIMARY KEY,
                name         TEXT NOT NULL,
                display_name TEXT NOT NULL,
                token_hash   TEXT NOT NULL UNIQUE,
                is_active    BOOLEAN NOT NULL DEFAULT TRUE,
                is_admin     BOOLEAN NOT NULL DEFAULT FALSE,
                created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS settings (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_by UUID,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE TABLE IF NOT EXISTS shifts (
                owner_id   UUID NOT NULL REFERENCES owners(owner_id) ON DELETE CASCADE,
                shift_date DATE NOT NULL,
                slot_1     TEXT,
                slot_2     TEXT,
                notes      TEXT,
                provenance TEXT NOT NULL DEFAULT 'manual',
                synced     BOOLEAN NOT NULL DEFAULT FALSE,
                version    INTEGER NOT NULL DEFAULT 1,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (owner_id, shift_date)
            );
            CREATE INDEX IF NOT EXISTS idx_shifts_owner_date
                ON shifts (owner_id, shift_date);",
        )
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> RotaResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(query_failed)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn identity_from_row(row: &Row) -> Identity {
    Identity {
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        display_name: row.get("display_name"),
        token_hash: row.get("token_hash"),
        is_active: row.get("is_active"),
        is_admin: row.get("is_admin"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn setting_from_row(row: &Row) -> Setting {
    Setting {
        key: row.get("key"),
        value: row.get("value"),
        updated_by: row.get("updated_by"),
        updated_at: row.get("updated_at"),
    }
}

fn shift_from_row(row: &Row) -> ShiftRecord {
    let provenance: String = row.get("provenance");
    ShiftRecord {
        owner_id: row.get("owner_id"),
        shift_date: row.get("shift_date"),
        slot_1: row.get("slot_1"),
        slot_2: row.get("slot_2"),
        notes: row.get("notes"),
        provenance: provenance.parse().unwrap_or(Provenance::Manual),
        synced: row.get("synced"),
        version: row.get("version"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// IDENTITY REPOSITORY
// ============================================================================

#[async_trait]
impl IdentityRepository for DbClient {
    async fn find_by_token_hash(&self, token_hash: &str) -> RotaResult<Option<Identity>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM owners WHERE token_hash = $1 AND is_active",
                &[&token_hash],
            )
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn find_by_id(&self, owner_id: OwnerId) -> RotaResult<Option<Identity>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM owners WHERE owner_id = $1", &[&owner_id])
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn list_active(&self) -> RotaResult<Vec<Identity>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM owners WHERE is_active ORDER BY display_name",
                &[],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(identity_from_row).collect())
    }

    async fn find_admin(&self) -> RotaResult<Option<Identity>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM owners WHERE is_admin AND is_active ORDER BY created_at LIMIT 1",
                &[],
            )
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(identity_from_row))
    }

    async fn insert(&self, identity: &Identity) -> RotaResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO owners
                (owner_id, name, display_name, token_hash, is_active, is_admin, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &identity.owner_id,
                &identity.name,
                &identity.display_name,
                &identity.token_hash,
                &identity.is_active,
                &identity.is_admin,
                &identity.created_at,
                &identity.updated_at,
            ],
        )
        .await
        .map_err(|e| {
            RotaError::Storage(StorageError::InsertFailed {
                kind: EntityKind::Identity,
                reason: e.to_string(),
            })
        })?;
        Ok(())
    }

    async fn update(&self, identity: &Identity) -> RotaResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE owners
                 SET name = $2, display_name = $3, is_active = $4, is_admin = $5,
                     updated_at = now()
                 WHERE owner_id = $1",
                &[
                    &identity.owner_id,
                    &identity.name,
                    &identity.display_name,
                    &identity.is_active,
                    &identity.is_admin,
                ],
            )
            .await
            .map_err(query_failed)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: identity.owner_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn rotate_token(&self, owner_id: OwnerId, new_hash: &str) -> RotaResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE owners SET token_hash = $2, updated_at = now() WHERE owner_id = $1",
                &[&owner_id, &new_hash],
            )
            .await
            .map_err(query_failed)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: owner_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn deactivate(&self, owner_id: OwnerId) -> RotaResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE owners SET is_active = FALSE, updated_at = now() WHERE owner_id = $1",
                &[&owner_id],
            )
            .await
            .map_err(query_failed)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                kind: EntityKind::Identity,
                key: owner_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// SETTINGS REPOSITORY
// ============================================================================

#[async_trait]
impl SettingsRepository for DbClient {
    async fn get(&self, key: &str) -> RotaResult<Option<Setting>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt("SELECT * FROM settings WHERE key = $1", &[&key])
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(setting_from_row))
    }

    async fn upsert(
        &self,
        key: &str,
        value: &str,
        updated_by: Option<OwnerId>,
    ) -> RotaResult<Setting> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO settings (key, value, updated_by, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value,
                     updated_by = EXCLUDED.updated_by,
                     updated_at = now()
                 RETURNING *",
                &[&key, &value, &updated_by],
            )
            .await
            .map_err(query_failed)?;
        Ok(setting_from_row(&row))
    }

    async fn delete(&self, key: &str) -> RotaResult<bool> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM settings WHERE key = $1", &[&key])
            .await
            .map_err(query_failed)?;
        Ok(deleted > 0)
    }

    async fn all(&self) -> RotaResult<Vec<Setting>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT * FROM settings ORDER BY key", &[])
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(setting_from_row).collect())
    }
}

// ============================================================================
// SHIFT REPOSITORY
// ============================================================================

#[async_trait]
impl ShiftRepository for DbClient {
    async fn upsert(&self, record: &ShiftRecord) -> RotaResult<ShiftRecord> {
        let conn = self.conn().await?;
        // Row-level upsert: this is where concurrent writes to the same
        // (owner, date) are serialized.
        let row = conn
            .query_one(
                "INSERT INTO shifts
                    (owner_id, shift_date, slot_1, slot_2, notes, provenance, synced, version, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 1, now())
                 ON CONFLICT (owner_id, shift_date) DO UPDATE
                 SET slot_1 = EXCLUDED.slot_1,
                     slot_2 = EXCLUDED.slot_2,
                     notes = EXCLUDED.notes,
                     provenance = EXCLUDED.provenance,
                     synced = EXCLUDED.synced,
                     version = shifts.version + 1,
                     updated_at = now()
                 RETURNING *",
                &[
                    &record.owner_id,
                    &record.shift_date,
                    &record.slot_1,
                    &record.slot_2,
                    &record.notes,
                    &record.provenance.as_str(),
                    &record.synced,
                ],
            )
            .await
            .map_err(query_failed)?;
        Ok(shift_from_row(&row))
    }

    async fn find(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<Option<ShiftRecord>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM shifts WHERE owner_id = $1 AND shift_date = $2",
                &[&owner_id, &date],
            )
            .await
            .map_err(query_failed)?;
        Ok(row.as_ref().map(shift_from_row))
    }

    async fn range(
        &self,
        owner_id: OwnerId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> RotaResult<Vec<ShiftRecord>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM shifts
                 WHERE owner_id = $1
                   AND ($2::date IS NULL OR shift_date >= $2)
                   AND ($3::date IS NULL OR shift_date <= $3)
                 ORDER BY shift_date",
                &[&owner_id, &start, &end],
            )
            .await
            .map_err(query_failed)?;
        Ok(rows.iter().map(shift_from_row).collect())
    }

    async fn delete(&self, owner_id: OwnerId, date: NaiveDate) -> RotaResult<bool> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM shifts WHERE owner_id = $1 AND shift_date = $2",
                &[&owner_id, &date],
            )
            .await
            .map_err(query_failed)?;
        Ok(deleted > 0)
    }

    async fn mark_synced(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
        synced: bool,
    ) -> RotaResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE shifts SET synced = $3 WHERE owner_id = $1 AND shift_date = $2",
                &[&owner_id, &date, &synced],
            )
            .await
            .map_err(query_failed)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                kind: EntityKind::Shift,
                key: format!("{owner_id}/{date}"),
            }
            .into());
        }
        Ok(())
    }
}
