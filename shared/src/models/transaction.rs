//! Ledger transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OwnerScope;

/// Quantity-changing event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Purchase,
    Allocation,
    Return,
    Adjustment,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Allocation => "allocation",
            TransactionType::Return => "return",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(TransactionType::Purchase),
            "allocation" => Some(TransactionType::Allocation),
            "return" => Some(TransactionType::Return),
            "adjustment" => Some(TransactionType::Adjustment),
            "transfer" => Some(TransactionType::Transfer),
            _ => None,
        }
    }
}

/// Which leg of a transfer a transaction is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Incoming => "incoming",
            TransferDirection::Outgoing => "outgoing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(TransferDirection::Incoming),
            "outgoing" => Some(TransferDirection::Outgoing),
            _ => None,
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            TransferDirection::Incoming => TransferDirection::Outgoing,
            TransferDirection::Outgoing => TransferDirection::Incoming,
        }
    }
}

/// How an adjustment's quantity is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentMode {
    /// Quantity is a signed amount added to the level
    #[default]
    Delta,
    /// Quantity is the new on-hand value
    Absolute,
}

impl AdjustmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentMode::Delta => "delta",
            AdjustmentMode::Absolute => "absolute",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "delta" => Some(AdjustmentMode::Delta),
            "absolute" => Some(AdjustmentMode::Absolute),
            _ => None,
        }
    }
}

/// An immutable, recorded ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub scope: OwnerScope,
    pub material_id: String,
    pub transaction_type: TransactionType,
    /// Magnitude; the effect on the level depends on type and direction
    pub quantity: Decimal,
    pub direction: Option<TransferDirection>,
    pub adjustment_mode: Option<AdjustmentMode>,
    pub counterparty_scope: Option<OwnerScope>,
    pub transfer_id: Option<Uuid>,
    /// Transaction this entry compensates
    pub reverses: Option<Uuid>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Level version produced by this entry
    pub level_version: i64,
    pub actor: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A transaction to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Caller-chosen id; makes a retried append idempotent
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub scope: OwnerScope,
    pub material_id: String,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    #[serde(default)]
    pub direction: Option<TransferDirection>,
    #[serde(default)]
    pub counterparty_scope: Option<OwnerScope>,
    #[serde(default)]
    pub transfer_id: Option<Uuid>,
    #[serde(default)]
    pub reverses: Option<Uuid>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn new(
        scope: OwnerScope,
        material_id: impl Into<String>,
        transaction_type: TransactionType,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            material_id: material_id.into(),
            transaction_type,
            quantity,
            direction: None,
            counterparty_scope: None,
            transfer_id: None,
            reverses: None,
            reference: None,
            notes: None,
        }
    }

    /// One leg of a transfer
    pub fn transfer_leg(
        scope: OwnerScope,
        material_id: impl Into<String>,
        quantity: Decimal,
        direction: TransferDirection,
        counterparty: OwnerScope,
    ) -> Self {
        Self {
            direction: Some(direction),
            counterparty_scope: Some(counterparty),
            ..Self::new(scope, material_id, TransactionType::Transfer, quantity)
        }
    }

    pub fn with_transfer_id(mut self, transfer_id: Uuid) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Stamp the fields assigned at commit time
    pub fn into_transaction(
        self,
        adjustment_mode: Option<AdjustmentMode>,
        level_version: i64,
        actor: Uuid,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id: self.id,
            scope: self.scope,
            material_id: self.material_id,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            direction: self.direction,
            adjustment_mode,
            counterparty_scope: self.counterparty_scope,
            transfer_id: self.transfer_id,
            reverses: self.reverses,
            reference: self.reference,
            notes: self.notes,
            level_version,
            actor,
            created_at,
        }
    }
}
