//! Ledger arithmetic: how each transaction type moves a stock level.
//!
//! The signed effect of an entry is a pure function of its type, direction
//! and adjustment mode. Replaying a key's history from its baseline through
//! [`replay`] must reproduce the stored snapshot.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{
    AdjustmentMode, NewTransaction, Transaction, TransactionType, TransferDirection,
};

/// Rejections raised before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl LedgerError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Invalid {
            field,
            message: message.into(),
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            LedgerError::Invalid { field, .. } => field,
        }
    }
}

/// What an entry does to the level it targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Add a signed amount
    Delta(Decimal),
    /// Replace the on-hand value
    Set(Decimal),
}

impl Effect {
    /// `None` when the result leaves the decimal range
    pub fn apply(&self, current: Decimal) -> Option<Decimal> {
        match self {
            Effect::Delta(delta) => current.checked_add(*delta),
            Effect::Set(value) => Some(*value),
        }
    }
}

/// Signed effect for an entry's type, direction and adjustment mode
pub fn effect(
    transaction_type: TransactionType,
    quantity: Decimal,
    direction: Option<TransferDirection>,
    adjustment_mode: Option<AdjustmentMode>,
) -> Effect {
    match transaction_type {
        TransactionType::Purchase | TransactionType::Return => Effect::Delta(quantity),
        TransactionType::Allocation => Effect::Delta(-quantity),
        TransactionType::Adjustment => match adjustment_mode.unwrap_or_default() {
            AdjustmentMode::Delta => Effect::Delta(quantity),
            AdjustmentMode::Absolute => Effect::Set(quantity),
        },
        TransactionType::Transfer => match direction {
            Some(TransferDirection::Incoming) => Effect::Delta(quantity),
            Some(TransferDirection::Outgoing) => Effect::Delta(-quantity),
            None => Effect::Delta(Decimal::ZERO),
        },
    }
}

/// Effect of a recorded entry
pub fn effect_of(transaction: &Transaction) -> Effect {
    effect(
        transaction.transaction_type,
        transaction.quantity,
        transaction.direction,
        transaction.adjustment_mode,
    )
}

/// Check an entry's shape before it reaches storage.
///
/// `adjustment_mode` is the mode that will be stamped on adjustments.
pub fn validate_new(new: &NewTransaction, adjustment_mode: AdjustmentMode) -> Result<(), LedgerError> {
    crate::validation::validate_material_id(&new.material_id)
        .map_err(|e| LedgerError::invalid("material_id", e))?;

    match new.transaction_type {
        TransactionType::Adjustment => match adjustment_mode {
            AdjustmentMode::Delta if new.quantity.is_zero() => {
                return Err(LedgerError::invalid("quantity", "Adjustment must not be zero"));
            }
            AdjustmentMode::Absolute if new.quantity < Decimal::ZERO => {
                return Err(LedgerError::invalid(
                    "quantity",
                    "Absolute adjustment cannot be negative",
                ));
            }
            _ => crate::validation::validate_quantity_range(new.quantity)
                .map_err(|e| LedgerError::invalid("quantity", e))?,
        },
        _ => {
            crate::validation::validate_positive_quantity(new.quantity)
                .map_err(|e| LedgerError::invalid("quantity", e))?;
        }
    }

    match (new.transaction_type, new.direction) {
        (TransactionType::Transfer, None) => {
            return Err(LedgerError::invalid(
                "direction",
                "Transfer entries need a direction",
            ));
        }
        (TransactionType::Transfer, Some(_)) if new.counterparty_scope.is_none() => {
            return Err(LedgerError::invalid(
                "counterparty_scope",
                "Transfer entries need a counterparty scope",
            ));
        }
        (TransactionType::Transfer, _) => {}
        (_, Some(_)) => {
            return Err(LedgerError::invalid(
                "direction",
                "Only transfer entries carry a direction",
            ));
        }
        (_, None) => {}
    }

    if let Some(counterparty) = new.counterparty_scope {
        if counterparty == new.scope {
            return Err(LedgerError::invalid(
                "counterparty_scope",
                "Counterparty must differ from the owning scope",
            ));
        }
        // allocation/return legs are paired with a counterparty only inside a transfer
        if new.transaction_type != TransactionType::Transfer && new.transfer_id.is_none() {
            return Err(LedgerError::invalid(
                "counterparty_scope",
                "Counterparty is only recorded on transfer legs",
            ));
        }
    }

    Ok(())
}

/// Recompute a level from its baseline and the entries recorded after it.
///
/// Entries at or below `baseline_version` are already folded into the
/// baseline and are ignored. `None` when the running total overflows.
pub fn replay<'a>(
    baseline_quantity: Decimal,
    baseline_version: i64,
    history: impl IntoIterator<Item = &'a Transaction>,
) -> Option<Decimal> {
    let mut entries: Vec<&Transaction> = history
        .into_iter()
        .filter(|t| t.level_version > baseline_version)
        .collect();
    entries.sort_by_key(|t| t.level_version);
    entries
        .into_iter()
        .try_fold(baseline_quantity, |acc, t| effect_of(t).apply(acc))
}
