//! Current stock snapshots per (scope, material)

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use shared::{validate_material_id, validate_non_negative_quantity, LevelMeta, LevelRecord, OwnerScope, RestockNeed};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, StoreError};

/// Reads and snapshot corrections for level records.
///
/// Ledger-driven changes go through
/// [`TransactionLog`](super::TransactionLog); writes here are corrections
/// that start a new replay baseline.
#[derive(Clone)]
pub struct LevelStore {
    store: Arc<dyn InventoryStore>,
    max_cas_retries: u32,
}

impl LevelStore {
    pub fn new(store: Arc<dyn InventoryStore>, max_cas_retries: u32) -> Self {
        Self {
            store,
            max_cas_retries: max_cas_retries.max(1),
        }
    }

    pub async fn get(&self, scope: &OwnerScope, material_id: &str) -> AppResult<Option<LevelRecord>> {
        Ok(self.store.get_level(scope, material_id).await?)
    }

    /// Like [`get`](Self::get), but absence is an error
    pub async fn require(&self, scope: &OwnerScope, material_id: &str) -> AppResult<LevelRecord> {
        self.get(scope, material_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock level for {} at {}", material_id, scope)))
    }

    /// Ordered by material id
    pub async fn list(&self, scope: &OwnerScope) -> AppResult<Vec<LevelRecord>> {
        Ok(self.store.list_levels(scope).await?)
    }

    /// Set the on-hand quantity and any descriptive fields present in `meta`.
    ///
    /// Creates the record if absent. The written quantity becomes the new
    /// replay baseline.
    #[tracing::instrument(skip(self, scope, meta), fields(scope = %scope))]
    pub async fn upsert(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        quantity: Decimal,
        meta: &LevelMeta,
        actor: Uuid,
    ) -> AppResult<LevelRecord> {
        validate_material_id(material_id).map_err(|e| AppError::validation("material_id", e))?;
        validate_non_negative_quantity(quantity).map_err(|e| AppError::validation("quantity", e))?;
        validate_meta(meta)?;

        self.write_with_retry(scope, material_id, |existing| {
            let now = Utc::now();
            match existing {
                None => {
                    let mut record =
                        LevelRecord::new(*scope, material_id, quantity, Some(actor), now);
                    record.apply_meta(meta);
                    Some(record)
                }
                Some(mut record) => {
                    record.version += 1;
                    record.current_quantity = quantity;
                    record.baseline_quantity = quantity;
                    record.baseline_version = record.version;
                    record.apply_meta(meta);
                    record.updated_at = now;
                    record.updated_by = Some(actor);
                    Some(record)
                }
            }
        })
        .await
    }

    /// Update descriptive fields only; quantity and baseline are untouched
    pub async fn update_meta(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        meta: &LevelMeta,
        actor: Uuid,
    ) -> AppResult<LevelRecord> {
        validate_meta(meta)?;

        self.write_with_retry(scope, material_id, |existing| {
            existing.map(|mut record| {
                record.version += 1;
                record.apply_meta(meta);
                record.updated_at = Utc::now();
                record.updated_by = Some(actor);
                record
            })
        })
        .await
    }

    pub async fn mark_stock_check(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        actor: Uuid,
    ) -> AppResult<LevelRecord> {
        let meta = LevelMeta {
            last_stock_check: Some(Utc::now()),
            ..Default::default()
        };
        self.update_meta(scope, material_id, &meta, actor).await
    }

    /// Records at or below their reorder threshold
    pub async fn low_stock(&self, scope: &OwnerScope) -> AppResult<Vec<LevelRecord>> {
        let levels = self.list(scope).await?;
        Ok(levels.into_iter().filter(LevelRecord::is_low_stock).collect())
    }

    /// Records below their standard stocking level
    pub async fn restock_needs(&self, scope: &OwnerScope) -> AppResult<Vec<RestockNeed>> {
        let levels = self.list(scope).await?;
        Ok(levels
            .into_iter()
            .filter_map(|level| {
                let shortfall = level.restock_shortfall()?;
                let standard_quantity = level.standard_quantity?;
                Some(RestockNeed {
                    material_id: level.material_id,
                    current_quantity: level.current_quantity,
                    standard_quantity,
                    shortfall,
                })
            })
            .collect())
    }

    /// Read-modify-write under compare-and-swap.
    ///
    /// `next` returns `None` when the record is required but missing.
    async fn write_with_retry<F>(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        next: F,
    ) -> AppResult<LevelRecord>
    where
        F: Fn(Option<LevelRecord>) -> Option<LevelRecord>,
    {
        for attempt in 1..=self.max_cas_retries {
            let existing = self.store.get_level(scope, material_id).await?;
            let expected = existing.as_ref().map(|l| l.version);
            let record = next(existing).ok_or_else(|| {
                AppError::NotFound(format!("Stock level for {} at {}", material_id, scope))
            })?;

            match self.store.put_level(&record, expected).await {
                Ok(()) => return Ok(record),
                Err(err @ StoreError::VersionConflict { .. }) => {
                    tracing::warn!(attempt, "level write lost a race, retrying: {}", err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "Stock level for {} at {} kept changing; gave up after {} attempts",
            material_id, scope, self.max_cas_retries
        )))
    }
}

fn validate_meta(meta: &LevelMeta) -> AppResult<()> {
    if let Some(min) = meta.min_quantity {
        validate_non_negative_quantity(min).map_err(|e| AppError::validation("min_quantity", e))?;
    }
    if let Some(standard) = meta.standard_quantity {
        validate_non_negative_quantity(standard)
            .map_err(|e| AppError::validation("standard_quantity", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> LevelStore {
        LevelStore::new(Arc::new(MemoryStore::new()), 3)
    }

    #[tokio::test]
    async fn upsert_creates_then_overwrites() {
        let levels = service();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        let actor = Uuid::new_v4();

        let created = levels
            .upsert(&scope, "M1", Decimal::from(10), &LevelMeta::default(), actor)
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.created_by, Some(actor));

        let meta = LevelMeta {
            min_quantity: Some(Decimal::from(4)),
            ..Default::default()
        };
        let updated = levels
            .upsert(&scope, "M1", Decimal::from(3), &meta, actor)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.baseline_quantity, Decimal::from(3));
        assert_eq!(updated.baseline_version, 2);
        assert!(updated.is_low_stock());
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn upsert_rejects_negative_quantity() {
        let levels = service();
        let scope = OwnerScope::warehouse(Uuid::new_v4());
        let err = levels
            .upsert(&scope, "M1", Decimal::from(-1), &LevelMeta::default(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
    }

    #[tokio::test]
    async fn meta_update_requires_existing_record() {
        let levels = service();
        let scope = OwnerScope::vehicle(Uuid::new_v4());
        let err = levels
            .mark_stock_check(&scope, "M1", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn restock_needs_lists_shortfalls_only() {
        let levels = service();
        let scope = OwnerScope::vehicle(Uuid::new_v4());
        let actor = Uuid::new_v4();
        let standard = |q: i64| LevelMeta {
            standard_quantity: Some(Decimal::from(q)),
            ..Default::default()
        };

        levels.upsert(&scope, "M1", Decimal::from(2), &standard(10), actor).await.unwrap();
        levels.upsert(&scope, "M2", Decimal::from(12), &standard(10), actor).await.unwrap();
        levels.upsert(&scope, "M3", Decimal::from(1), &LevelMeta::default(), actor).await.unwrap();

        let needs = levels.restock_needs(&scope).await.unwrap();
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].material_id, "M1");
        assert_eq!(needs[0].shortfall, Decimal::from(8));
    }
}
