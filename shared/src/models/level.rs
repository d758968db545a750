//! Stock level snapshots

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OwnerScope;

/// Current quantity-on-hand for one (scope, material) key.
///
/// This is derived state: `current_quantity` must equal `baseline_quantity`
/// plus the effects of every transaction recorded after `baseline_version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub scope: OwnerScope,
    pub material_id: String,
    pub current_quantity: Decimal,
    /// Reorder threshold
    pub min_quantity: Option<Decimal>,
    /// Target stocking level (vehicles)
    pub standard_quantity: Option<Decimal>,
    pub location: Option<String>,
    pub last_stock_check: Option<DateTime<Utc>>,
    /// Incremented on every write; guards compare-and-swap updates
    pub version: i64,
    pub baseline_quantity: Decimal,
    pub baseline_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

/// Optional descriptive fields carried by an upsert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelMeta {
    pub min_quantity: Option<Decimal>,
    pub standard_quantity: Option<Decimal>,
    pub location: Option<String>,
    pub last_stock_check: Option<DateTime<Utc>>,
}

impl LevelRecord {
    /// A fresh record at version 1 whose baseline is its initial quantity
    pub fn new(
        scope: OwnerScope,
        material_id: impl Into<String>,
        quantity: Decimal,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            scope,
            material_id: material_id.into(),
            current_quantity: quantity,
            min_quantity: None,
            standard_quantity: None,
            location: None,
            last_stock_check: None,
            version: 1,
            baseline_quantity: quantity,
            baseline_version: 1,
            created_at: now,
            updated_at: now,
            created_by: actor,
            updated_by: actor,
        }
    }

    /// Overwrite descriptive fields that are present in `meta`
    pub fn apply_meta(&mut self, meta: &LevelMeta) {
        if meta.min_quantity.is_some() {
            self.min_quantity = meta.min_quantity;
        }
        if meta.standard_quantity.is_some() {
            self.standard_quantity = meta.standard_quantity;
        }
        if meta.location.is_some() {
            self.location = meta.location.clone();
        }
        if meta.last_stock_check.is_some() {
            self.last_stock_check = meta.last_stock_check;
        }
    }

    /// At or below the reorder threshold
    pub fn is_low_stock(&self) -> bool {
        self.min_quantity
            .map(|min| self.current_quantity <= min)
            .unwrap_or(false)
    }

    /// Quantity needed to reach the standard stocking level, if any
    pub fn restock_shortfall(&self) -> Option<Decimal> {
        self.standard_quantity
            .map(|standard| standard - self.current_quantity)
            .filter(|shortfall| *shortfall > Decimal::ZERO)
    }
}

/// A vehicle (or warehouse) line that is below its standard quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestockNeed {
    pub material_id: String,
    pub current_quantity: Decimal,
    pub standard_quantity: Decimal,
    pub shortfall: Decimal,
}
