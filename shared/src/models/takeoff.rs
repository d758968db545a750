//! Material takeoffs derived from estimates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OwnerScope;

/// One material requirement, netted against stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeoffLine {
    pub material_id: String,
    pub name: String,
    pub category: Option<String>,
    pub phases: Vec<String>,
    pub raw_quantity: Decimal,
    pub waste_factor: Decimal,
    pub adjusted_quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub allocated_from_stock: Decimal,
    pub purchase_needed: Decimal,
    pub purchase_cost: Decimal,
}

/// An estimate line left out of a takeoff, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLineItem {
    pub room: String,
    /// 1-based position within the room
    pub item: usize,
    pub assembly_id: String,
    pub reason: String,
}

/// The computed content of a takeoff, without identity or timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeoffPlan {
    pub lines: Vec<TakeoffLine>,
    pub skipped_items: Vec<SkippedLineItem>,
    pub total_cost: Decimal,
    pub total_purchase_cost: Decimal,
}

/// Takeoff lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeoffStatus {
    Draft,
    Approved,
    /// Stock has been allocated from the warehouse ledger
    Allocated,
    Cancelled,
}

impl TakeoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TakeoffStatus::Draft => "draft",
            TakeoffStatus::Approved => "approved",
            TakeoffStatus::Allocated => "allocated",
            TakeoffStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TakeoffStatus::Draft),
            "approved" => Some(TakeoffStatus::Approved),
            "allocated" => Some(TakeoffStatus::Allocated),
            "cancelled" => Some(TakeoffStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: TakeoffStatus) -> bool {
        matches!(
            (self, next),
            (TakeoffStatus::Draft, TakeoffStatus::Approved)
                | (TakeoffStatus::Draft, TakeoffStatus::Cancelled)
                | (TakeoffStatus::Approved, TakeoffStatus::Allocated)
                | (TakeoffStatus::Approved, TakeoffStatus::Cancelled)
                | (TakeoffStatus::Approved, TakeoffStatus::Draft)
        )
    }
}

/// A persisted takeoff for one estimate snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialTakeoff {
    pub id: Uuid,
    pub project_id: Uuid,
    pub estimate_id: Uuid,
    pub estimate_version: i32,
    /// Scope whose stock the plan was netted against
    pub stock_scope: OwnerScope,
    pub status: TakeoffStatus,
    pub lines: Vec<TakeoffLine>,
    pub skipped_items: Vec<SkippedLineItem>,
    pub total_cost: Decimal,
    pub total_purchase_cost: Decimal,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
}
