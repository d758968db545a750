//! Persistence port for the inventory ledger
//!
//! Services depend on these traits, never on a concrete database client.
//! Adapters: [`PgStore`] (PostgreSQL via sqlx) and [`MemoryStore`]
//! (in-process, for tests and local development). [`RetryingStore`] wraps
//! either with bounded backoff for transient failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    Assembly, Estimate, LevelRecord, MaterialTakeoff, Material, OwnerScope, TakeoffStatus,
    Transaction,
};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
pub mod retry;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use retry::{RetryPolicy, RetryingStore};

/// Failures reported by a storage adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("version conflict on {key}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        key: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    #[error("transaction {0} already recorded")]
    DuplicateTransaction(Uuid),

    #[error("a takeoff already exists for estimate {0}")]
    DuplicateTakeoff(Uuid),

    /// Transient; safe to retry
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn conflict(level: &LevelRecord, expected: Option<i64>, actual: Option<i64>) -> Self {
        StoreError::VersionConflict {
            key: format!("{}/{}", level.scope, level.material_id),
            expected,
            actual,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Level snapshots and the append-only transaction log
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_level(&self, scope: &OwnerScope, material_id: &str)
        -> StoreResult<Option<LevelRecord>>;

    /// All levels of a scope, ordered by material id
    async fn list_levels(&self, scope: &OwnerScope) -> StoreResult<Vec<LevelRecord>>;

    /// Compare-and-swap write of a level snapshot.
    ///
    /// `expected_version` is the version the caller read; `None` means the
    /// record must not exist yet.
    async fn put_level(&self, level: &LevelRecord, expected_version: Option<i64>)
        -> StoreResult<()>;

    /// Insert `transaction` and write `level` as one atomic unit
    async fn commit_entry(
        &self,
        transaction: &Transaction,
        level: &LevelRecord,
        expected_version: Option<i64>,
    ) -> StoreResult<()>;

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    /// Newest first, across scopes
    async fn transactions_for_material(&self, material_id: &str, limit: u32)
        -> StoreResult<Vec<Transaction>>;

    /// Newest first, across materials
    async fn transactions_for_scope(&self, scope: &OwnerScope, limit: u32)
        -> StoreResult<Vec<Transaction>>;

    /// Full history of one key, oldest first
    async fn transactions_for_key(&self, scope: &OwnerScope, material_id: &str)
        -> StoreResult<Vec<Transaction>>;
}

/// Persisted takeoffs
#[async_trait]
pub trait TakeoffStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateTakeoff`] if one exists for the estimate
    async fn insert_takeoff(&self, takeoff: &MaterialTakeoff) -> StoreResult<()>;

    async fn get_takeoff(&self, id: Uuid) -> StoreResult<Option<MaterialTakeoff>>;

    async fn find_takeoff(&self, project_id: Uuid, estimate_id: Uuid)
        -> StoreResult<Option<MaterialTakeoff>>;

    /// Newest first
    async fn list_takeoffs(&self, project_id: Uuid) -> StoreResult<Vec<MaterialTakeoff>>;

    /// Set the status if it still equals `from`; returns whether it changed
    async fn update_takeoff_status(
        &self,
        id: Uuid,
        from: TakeoffStatus,
        to: TakeoffStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// Read-only material catalog. Absence is `Ok(None)`, never an error.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_assembly(&self, assembly_id: &str) -> StoreResult<Option<Assembly>>;

    async fn get_material(&self, material_id: &str) -> StoreResult<Option<Material>>;
}

/// Read-only estimate collaborator
#[async_trait]
pub trait EstimateSource: Send + Sync {
    /// Latest estimate revision for a project
    async fn get_estimate(&self, project_id: Uuid) -> StoreResult<Option<Estimate>>;
}
