//! Append-only ledger of quantity-changing events
//!
//! Each append records one [`Transaction`] and moves its level snapshot in
//! the same atomic store commit. Snapshots can always be recomputed from
//! their baseline plus the entries recorded after it.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    clamp_limit,
    ledger::{self, effect},
    validate_quantity_range, AdjustmentMode, LevelRecord, NewTransaction, OwnerScope, Transaction,
    TransactionType,
};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, StoreError};

/// A recorded entry together with the snapshot it produced
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    pub level: LevelRecord,
}

/// Snapshot versus ledger for one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub scope: OwnerScope,
    pub material_id: String,
    pub snapshot_quantity: Decimal,
    pub ledger_quantity: Decimal,
    pub consistent: bool,
    pub version: i64,
    pub entries_since_baseline: usize,
}

#[derive(Clone)]
pub struct TransactionLog {
    store: Arc<dyn InventoryStore>,
    adjustment_mode: AdjustmentMode,
    max_cas_retries: u32,
    history_default_limit: u32,
    history_max_limit: u32,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn InventoryStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            adjustment_mode: config.adjustment_mode,
            max_cas_retries: config.max_cas_retries.max(1),
            history_default_limit: config.history_default_limit,
            history_max_limit: config.history_max_limit,
        }
    }

    pub fn adjustment_mode(&self) -> AdjustmentMode {
        self.adjustment_mode
    }

    /// Record an entry and apply it to its level
    pub async fn append(&self, new: NewTransaction, actor: Uuid) -> AppResult<Transaction> {
        Ok(self.record(new, actor).await?.transaction)
    }

    /// Record an entry, returning the level it produced.
    ///
    /// Retrying with an id that is already recorded returns the recorded
    /// entry instead of applying it twice.
    #[tracing::instrument(
        skip(self, new),
        fields(
            transaction_id = %new.id,
            scope = %new.scope,
            material_id = %new.material_id,
            transaction_type = new.transaction_type.as_str()
        )
    )]
    pub async fn record(&self, new: NewTransaction, actor: Uuid) -> AppResult<LedgerEntry> {
        ledger::validate_new(&new, self.adjustment_mode)?;

        if let Some(existing) = self.store.get_transaction(new.id).await? {
            tracing::debug!("transaction already recorded, returning it");
            return self.existing_entry(existing).await;
        }

        let adjustment_mode =
            (new.transaction_type == TransactionType::Adjustment).then_some(self.adjustment_mode);
        let change = effect(new.transaction_type, new.quantity, new.direction, adjustment_mode);

        for attempt in 1..=self.max_cas_retries {
            let now = Utc::now();
            let current = self.store.get_level(&new.scope, &new.material_id).await?;
            let available = current
                .as_ref()
                .map(|l| l.current_quantity)
                .unwrap_or(Decimal::ZERO);
            let next_quantity = change
                .apply(available)
                .ok_or_else(|| AppError::validation("quantity", "Resulting stock level is out of range"))?;
            if next_quantity < Decimal::ZERO {
                return Err(AppError::InsufficientStock {
                    material_id: new.material_id.clone(),
                    requested: new.quantity,
                    available,
                });
            }
            validate_quantity_range(next_quantity)
                .map_err(|_| AppError::validation("quantity", "Resulting stock level is out of range"))?;

            let (level, expected) = match current {
                Some(current) => {
                    let expected = current.version;
                    let mut level = current;
                    level.current_quantity = next_quantity;
                    level.version += 1;
                    level.updated_at = now;
                    level.updated_by = Some(actor);
                    (level, Some(expected))
                }
                None => {
                    // implicit zero baseline at version 0; this entry produces version 1
                    let mut level =
                        LevelRecord::new(new.scope, new.material_id.clone(), next_quantity, Some(actor), now);
                    level.baseline_quantity = Decimal::ZERO;
                    level.baseline_version = 0;
                    (level, None)
                }
            };

            let transaction = new
                .clone()
                .into_transaction(adjustment_mode, level.version, actor, now);

            match self.store.commit_entry(&transaction, &level, expected).await {
                Ok(()) => {
                    tracing::info!(
                        level_version = level.version,
                        quantity = %level.current_quantity,
                        "ledger entry recorded"
                    );
                    return Ok(LedgerEntry { transaction, level });
                }
                Err(err @ StoreError::VersionConflict { .. }) => {
                    tracing::warn!(attempt, "level moved during append, retrying: {}", err);
                }
                Err(StoreError::DuplicateTransaction(id)) => {
                    let existing = self.store.get_transaction(id).await?.ok_or_else(|| {
                        AppError::Persistence(format!("transaction {} reported duplicate but missing", id))
                    })?;
                    return self.existing_entry(existing).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "Stock level for {} at {} kept changing; gave up after {} attempts",
            new.material_id, new.scope, self.max_cas_retries
        )))
    }

    async fn existing_entry(&self, transaction: Transaction) -> AppResult<LedgerEntry> {
        let level = self
            .store
            .get_level(&transaction.scope, &transaction.material_id)
            .await?
            .ok_or_else(|| {
                AppError::IntegrityViolation(format!(
                    "transaction {} is recorded but its level is missing",
                    transaction.id
                ))
            })?;
        Ok(LedgerEntry { transaction, level })
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {}", id)))
    }

    /// Newest first, across scopes
    pub async fn for_material(&self, material_id: &str, limit: Option<u32>) -> AppResult<Vec<Transaction>> {
        let limit = clamp_limit(limit, self.history_default_limit, self.history_max_limit);
        Ok(self.store.transactions_for_material(material_id, limit).await?)
    }

    /// Newest first, across materials
    pub async fn for_scope(&self, scope: &OwnerScope, limit: Option<u32>) -> AppResult<Vec<Transaction>> {
        let limit = clamp_limit(limit, self.history_default_limit, self.history_max_limit);
        Ok(self.store.transactions_for_scope(scope, limit).await?)
    }

    /// Newest first, one (scope, material) key
    pub async fn for_key(
        &self,
        scope: &OwnerScope,
        material_id: &str,
        limit: Option<u32>,
    ) -> AppResult<Vec<Transaction>> {
        let limit = clamp_limit(limit, self.history_default_limit, self.history_max_limit);
        let mut history = self.store.transactions_for_key(scope, material_id).await?;
        history.reverse();
        history.truncate(limit as usize);
        Ok(history)
    }

    /// Recompute a level from its baseline and history
    pub async fn replay(&self, scope: &OwnerScope, material_id: &str) -> AppResult<Decimal> {
        Ok(self.reconcile(scope, material_id).await?.ledger_quantity)
    }

    pub async fn reconcile(&self, scope: &OwnerScope, material_id: &str) -> AppResult<Reconciliation> {
        let level = self
            .store
            .get_level(scope, material_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock level for {} at {}", material_id, scope)))?;
        let history = self.store.transactions_for_key(scope, material_id).await?;

        let ledger_quantity = ledger::replay(level.baseline_quantity, level.baseline_version, &history)
            .ok_or_else(|| {
                AppError::IntegrityViolation(format!(
                    "ledger for {} at {} overflows on replay",
                    material_id, scope
                ))
            })?;
        let entries_since_baseline = history
            .iter()
            .filter(|t| t.level_version > level.baseline_version)
            .count();
        let consistent = ledger_quantity == level.current_quantity;
        if !consistent {
            tracing::error!(
                scope = %scope,
                material_id,
                snapshot = %level.current_quantity,
                ledger = %ledger_quantity,
                "stock snapshot diverges from ledger"
            );
        }

        Ok(Reconciliation {
            scope: *scope,
            material_id: material_id.to_string(),
            snapshot_quantity: level.current_quantity,
            ledger_quantity,
            consistent,
            version: level.version,
            entries_since_baseline,
        })
    }

    /// Like [`reconcile`](Self::reconcile), but divergence is an error
    pub async fn verify(&self, scope: &OwnerScope, material_id: &str) -> AppResult<Reconciliation> {
        let report = self.reconcile(scope, material_id).await?;
        if !report.consistent {
            return Err(AppError::IntegrityViolation(format!(
                "{} at {}: snapshot {} but ledger {}",
                material_id, scope, report.snapshot_quantity, report.ledger_quantity
            )));
        }
        Ok(report)
    }

    /// Rewrite a divergent snapshot from the ledger
    #[tracing::instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn repair(&self, scope: &OwnerScope, material_id: &str, actor: Uuid) -> AppResult<LevelRecord> {
        for attempt in 1..=self.max_cas_retries {
            let report = self.reconcile(scope, material_id).await?;
            let level = self
                .store
                .get_level(scope, material_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Stock level for {} at {}", material_id, scope)))?;

            if report.consistent && level.version == report.version {
                return Ok(level);
            }
            if level.version != report.version {
                continue;
            }
            if report.ledger_quantity < Decimal::ZERO {
                return Err(AppError::IntegrityViolation(format!(
                    "ledger for {} at {} replays to negative {}",
                    material_id, scope, report.ledger_quantity
                )));
            }

            let expected = level.version;
            let mut repaired = level;
            repaired.current_quantity = report.ledger_quantity;
            repaired.version += 1;
            repaired.updated_at = Utc::now();
            repaired.updated_by = Some(actor);

            match self.store.put_level(&repaired, Some(expected)).await {
                Ok(()) => {
                    tracing::info!(
                        from = %report.snapshot_quantity,
                        to = %repaired.current_quantity,
                        "stock snapshot repaired from ledger"
                    );
                    return Ok(repaired);
                }
                Err(err @ StoreError::VersionConflict { .. }) => {
                    tracing::warn!(attempt, "level moved during repair, retrying: {}", err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Conflict(format!(
            "Stock level for {} at {} kept changing during repair",
            material_id, scope
        )))
    }
}
