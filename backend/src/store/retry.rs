//! Bounded exponential backoff at the persistence boundary

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    Assembly, Estimate, LevelRecord, Material, MaterialTakeoff, OwnerScope, TakeoffStatus,
    Transaction,
};
use uuid::Uuid;

use super::{
    CatalogSource, EstimateSource, InventoryStore, StoreResult, TakeoffStore,
};
use crate::config::PersistenceConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 120,
        }
    }
}

impl From<&PersistenceConfig> for RetryPolicy {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_backoff_ms: config.retry_base_backoff_ms,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only [`super::StoreError::Unavailable`] is retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &'static str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "transient storage failure, retrying: {}",
                    err
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Decorates a store so every call is retried under one policy
pub struct RetryingStore<S> {
    inner: Arc<S>,
    policy: RetryPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: Arc<S>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<S: InventoryStore> InventoryStore for RetryingStore<S> {
    async fn get_level(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Option<LevelRecord>> {
        with_retry(&self.policy, "get_level", || self.inner.get_level(scope, material_id)).await
    }

    async fn list_levels(&self, scope: &OwnerScope) -> StoreResult<Vec<LevelRecord>> {
        with_retry(&self.policy, "list_levels", || self.inner.list_levels(scope)).await
    }

    async fn put_level(&self, level: &LevelRecord, expected_version: Option<i64>) -> StoreResult<()> {
        with_retry(&self.policy, "put_level", || {
            self.inner.put_level(level, expected_version)
        })
        .await
    }

    async fn commit_entry(
        &self,
        transaction: &Transaction,
        level: &LevelRecord,
        expected_version: Option<i64>,
    ) -> StoreResult<()> {
        with_retry(&self.policy, "commit_entry", || {
            self.inner.commit_entry(transaction, level, expected_version)
        })
        .await
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        with_retry(&self.policy, "get_transaction", || self.inner.get_transaction(id)).await
    }

    async fn transactions_for_material(
        &self,
        material_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        with_retry(&self.policy, "transactions_for_material", || {
            self.inner.transactions_for_material(material_id, limit)
        })
        .await
    }

    async fn transactions_for_scope(
        &self,
        scope: &OwnerScope,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        with_retry(&self.policy, "transactions_for_scope", || {
            self.inner.transactions_for_scope(scope, limit)
        })
        .await
    }

    async fn transactions_for_key(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Vec<Transaction>> {
        with_retry(&self.policy, "transactions_for_key", || {
            self.inner.transactions_for_key(scope, material_id)
        })
        .await
    }
}

#[async_trait]
impl<S: TakeoffStore> TakeoffStore for RetryingStore<S> {
    async fn insert_takeoff(&self, takeoff: &MaterialTakeoff) -> StoreResult<()> {
        with_retry(&self.policy, "insert_takeoff", || self.inner.insert_takeoff(takeoff)).await
    }

    async fn get_takeoff(&self, id: Uuid) -> StoreResult<Option<MaterialTakeoff>> {
        with_retry(&self.policy, "get_takeoff", || self.inner.get_takeoff(id)).await
    }

    async fn find_takeoff(
        &self,
        project_id: Uuid,
        estimate_id: Uuid,
    ) -> StoreResult<Option<MaterialTakeoff>> {
        with_retry(&self.policy, "find_takeoff", || {
            self.inner.find_takeoff(project_id, estimate_id)
        })
        .await
    }

    async fn list_takeoffs(&self, project_id: Uuid) -> StoreResult<Vec<MaterialTakeoff>> {
        with_retry(&self.policy, "list_takeoffs", || self.inner.list_takeoffs(project_id)).await
    }

    async fn update_takeoff_status(
        &self,
        id: Uuid,
        from: TakeoffStatus,
        to: TakeoffStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        with_retry(&self.policy, "update_takeoff_status", || {
            self.inner.update_takeoff_status(id, from, to, at)
        })
        .await
    }
}

#[async_trait]
impl<S: CatalogSource> CatalogSource for RetryingStore<S> {
    async fn get_assembly(&self, assembly_id: &str) -> StoreResult<Option<Assembly>> {
        with_retry(&self.policy, "get_assembly", || self.inner.get_assembly(assembly_id)).await
    }

    async fn get_material(&self, material_id: &str) -> StoreResult<Option<Material>> {
        with_retry(&self.policy, "get_material", || self.inner.get_material(material_id)).await
    }
}

#[async_trait]
impl<S: EstimateSource> EstimateSource for RetryingStore<S> {
    async fn get_estimate(&self, project_id: Uuid) -> StoreResult<Option<Estimate>> {
        with_retry(&self.policy, "get_estimate", || self.inner.get_estimate(project_id)).await
    }
}
