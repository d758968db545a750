//! In-process store for tests and local development
//!
//! Every trait method runs inside one lock, which makes `commit_entry`
//! trivially atomic. Fault injection hooks let tests exercise retry and
//! compensation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    Assembly, Estimate, LevelRecord, Material, MaterialTakeoff, OwnerScope, TakeoffStatus,
    Transaction,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CatalogSource, EstimateSource, InventoryStore, StoreError, StoreResult, TakeoffStore,
};

type LevelKey = (OwnerScope, String);

#[derive(Default)]
struct MemoryState {
    levels: HashMap<LevelKey, LevelRecord>,
    /// Insertion order
    transactions: Vec<Transaction>,
    takeoffs: Vec<MaterialTakeoff>,
    assemblies: HashMap<String, Assembly>,
    materials: HashMap<String, Material>,
    estimates: HashMap<Uuid, Estimate>,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    /// Remaining transient failures for any call
    transient: usize,
    /// Remaining commit failures per scope
    commits: HashMap<OwnerScope, usize>,
}

impl Faults {
    fn check_transient(&mut self) -> StoreResult<()> {
        if self.transient > 0 {
            self.transient -= 1;
            return Err(StoreError::Unavailable("injected transient failure".to_string()));
        }
        Ok(())
    }

    fn check_commit(&mut self, scope: &OwnerScope) -> StoreResult<()> {
        if let Some(remaining) = self.commits.get_mut(scope) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!(
                    "injected commit failure for {}",
                    scope
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls served, including failed ones
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn insert_assembly(&self, assembly: Assembly) {
        self.state
            .lock()
            .await
            .assemblies
            .insert(assembly.id.clone(), assembly);
    }

    pub async fn insert_material(&self, material: Material) {
        self.state
            .lock()
            .await
            .materials
            .insert(material.id.clone(), material);
    }

    /// Replaces the project's current estimate
    pub async fn insert_estimate(&self, estimate: Estimate) {
        self.state
            .lock()
            .await
            .estimates
            .insert(estimate.project_id, estimate);
    }

    /// The next `times` calls of any kind fail as unavailable
    pub async fn inject_transient_failures(&self, times: usize) {
        self.state.lock().await.faults.transient = times;
    }

    /// The next `times` commits touching `scope` fail as unavailable
    pub async fn inject_commit_failures(&self, scope: OwnerScope, times: usize) {
        self.state.lock().await.faults.commits.insert(scope, times);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults = Faults::default();
    }

    /// Overwrite a snapshot without touching the ledger or the version
    pub async fn overwrite_level_unchecked(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        quantity: Decimal,
    ) -> bool {
        let mut state = self.state.lock().await;
        match state.levels.get_mut(&(*scope, material_id.to_string())) {
            Some(level) => {
                level.current_quantity = quantity;
                true
            }
            None => false,
        }
    }

    async fn enter(&self) -> StoreResult<tokio::sync::MutexGuard<'_, MemoryState>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;
        state.faults.check_transient()?;
        Ok(state)
    }
}

fn check_version(
    state: &MemoryState,
    level: &LevelRecord,
    expected: Option<i64>,
) -> StoreResult<()> {
    let key = (level.scope, level.material_id.clone());
    let actual = state.levels.get(&key).map(|l| l.version);
    if actual != expected {
        return Err(StoreError::conflict(level, expected, actual));
    }
    Ok(())
}

fn newest_first(mut transactions: Vec<Transaction>, limit: u32) -> Vec<Transaction> {
    transactions.reverse();
    transactions.truncate(limit as usize);
    transactions
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn get_level(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Option<LevelRecord>> {
        let state = self.enter().await?;
        Ok(state.levels.get(&(*scope, material_id.to_string())).cloned())
    }

    async fn list_levels(&self, scope: &OwnerScope) -> StoreResult<Vec<LevelRecord>> {
        let state = self.enter().await?;
        let mut levels: Vec<LevelRecord> = state
            .levels
            .values()
            .filter(|l| l.scope == *scope)
            .cloned()
            .collect();
        levels.sort_by(|a, b| a.material_id.cmp(&b.material_id));
        Ok(levels)
    }

    async fn put_level(&self, level: &LevelRecord, expected_version: Option<i64>) -> StoreResult<()> {
        let mut state = self.enter().await?;
        check_version(&state, level, expected_version)?;
        state
            .levels
            .insert((level.scope, level.material_id.clone()), level.clone());
        Ok(())
    }

    async fn commit_entry(
        &self,
        transaction: &Transaction,
        level: &LevelRecord,
        expected_version: Option<i64>,
    ) -> StoreResult<()> {
        let mut state = self.enter().await?;
        state.faults.check_commit(&transaction.scope)?;
        if state.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::DuplicateTransaction(transaction.id));
        }
        check_version(&state, level, expected_version)?;
        state.transactions.push(transaction.clone());
        state
            .levels
            .insert((level.scope, level.material_id.clone()), level.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let state = self.enter().await?;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transactions_for_material(
        &self,
        material_id: &str,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.enter().await?;
        let matching = state
            .transactions
            .iter()
            .filter(|t| t.material_id == material_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn transactions_for_scope(
        &self,
        scope: &OwnerScope,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.enter().await?;
        let matching = state
            .transactions
            .iter()
            .filter(|t| t.scope == *scope)
            .cloned()
            .collect();
        Ok(newest_first(matching, limit))
    }

    async fn transactions_for_key(
        &self,
        scope: &OwnerScope,
        material_id: &str,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.enter().await?;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.scope == *scope && t.material_id == material_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TakeoffStore for MemoryStore {
    async fn insert_takeoff(&self, takeoff: &MaterialTakeoff) -> StoreResult<()> {
        let mut state = self.enter().await?;
        let exists = state.takeoffs.iter().any(|t| {
            t.project_id == takeoff.project_id && t.estimate_id == takeoff.estimate_id
        });
        if exists {
            return Err(StoreError::DuplicateTakeoff(takeoff.estimate_id));
        }
        state.takeoffs.push(takeoff.clone());
        Ok(())
    }

    async fn get_takeoff(&self, id: Uuid) -> StoreResult<Option<MaterialTakeoff>> {
        let state = self.enter().await?;
        Ok(state.takeoffs.iter().find(|t| t.id == id).cloned())
    }

    async fn find_takeoff(
        &self,
        project_id: Uuid,
        estimate_id: Uuid,
    ) -> StoreResult<Option<MaterialTakeoff>> {
        let state = self.enter().await?;
        Ok(state
            .takeoffs
            .iter()
            .find(|t| t.project_id == project_id && t.estimate_id == estimate_id)
            .cloned())
    }

    async fn list_takeoffs(&self, project_id: Uuid) -> StoreResult<Vec<MaterialTakeoff>> {
        let state = self.enter().await?;
        Ok(state
            .takeoffs
            .iter()
            .rev()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn update_takeoff_status(
        &self,
        id: Uuid,
        from: TakeoffStatus,
        to: TakeoffStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.enter().await?;
        match state.takeoffs.iter_mut().find(|t| t.id == id) {
            Some(takeoff) if takeoff.status == from => {
                takeoff.status = to;
                takeoff.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn get_assembly(&self, assembly_id: &str) -> StoreResult<Option<Assembly>> {
        let state = self.enter().await?;
        Ok(state.assemblies.get(assembly_id).cloned())
    }

    async fn get_material(&self, material_id: &str) -> StoreResult<Option<Material>> {
        let state = self.enter().await?;
        Ok(state.materials.get(material_id).cloned())
    }
}

#[async_trait]
impl EstimateSource for MemoryStore {
    async fn get_estimate(&self, project_id: Uuid) -> StoreResult<Option<Estimate>> {
        let state = self.enter().await?;
        Ok(state.estimates.get(&project_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(scope: OwnerScope, version: i64) -> LevelRecord {
        let mut level = LevelRecord::new(scope, "M1", Decimal::from(5), None, Utc::now());
        level.version = version;
        level
    }

    #[tokio::test]
    async fn put_level_enforces_expected_version() {
        let store = MemoryStore::new();
        let scope = OwnerScope::warehouse(Uuid::new_v4());

        store.put_level(&level(scope, 1), None).await.unwrap();
        let err = store.put_level(&level(scope, 1), None).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { actual: Some(1), .. }));

        store.put_level(&level(scope, 2), Some(1)).await.unwrap();
        assert!(store.put_level(&level(scope, 3), Some(1)).await.is_err());
    }

    #[tokio::test]
    async fn transient_faults_are_consumed() {
        let store = MemoryStore::new();
        let scope = OwnerScope::vehicle(Uuid::new_v4());
        store.inject_transient_failures(2).await;

        assert!(store.get_level(&scope, "M1").await.unwrap_err().is_transient());
        assert!(store.get_level(&scope, "M1").await.is_err());
        assert!(store.get_level(&scope, "M1").await.unwrap().is_none());
        assert_eq!(store.call_count(), 3);
    }
}
