//! Two-leg stock movements between scopes
//!
//! A transfer debits the source, then credits the destination. If the
//! credit cannot be recorded, the debit is compensated with its inverse so
//! levels return to where they started. Both legs and any compensation stay
//! in the ledger for audit.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_material_id, validate_positive_quantity, LevelRecord, NewTransaction, OwnerScope,
    Transaction, TransactionType, TransferDirection,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::transaction_log::{LedgerEntry, TransactionLog};

/// Saga progress for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Requested,
    SourceDebited,
    DestCredited,
    Committed,
    CompensatingRollback,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Requested => "requested",
            TransferState::SourceDebited => "source_debited",
            TransferState::DestCredited => "dest_credited",
            TransferState::Committed => "committed",
            TransferState::CompensatingRollback => "compensating_rollback",
        }
    }

    pub fn can_transition_to(&self, next: TransferState) -> bool {
        matches!(
            (self, next),
            (TransferState::Requested, TransferState::SourceDebited)
                | (TransferState::SourceDebited, TransferState::DestCredited)
                | (TransferState::SourceDebited, TransferState::CompensatingRollback)
                | (TransferState::DestCredited, TransferState::Committed)
                | (TransferState::CompensatingRollback, TransferState::Requested)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for a scope-to-scope transfer
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub source: OwnerScope,
    pub destination: OwnerScope,
    pub material_id: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Outcome of a committed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub state: TransferState,
    pub outgoing: Transaction,
    pub incoming: Transaction,
    pub source_level: LevelRecord,
    pub destination_level: LevelRecord,
}

/// The ledger shape of one transfer
struct TransferPlan {
    transfer_id: Uuid,
    source: OwnerScope,
    destination: OwnerScope,
    material_id: String,
    quantity: Decimal,
    outgoing_type: TransactionType,
    incoming_type: TransactionType,
    reference: Option<String>,
    notes: Option<String>,
}

impl TransferPlan {
    fn leg(
        &self,
        scope: OwnerScope,
        counterparty: OwnerScope,
        transaction_type: TransactionType,
        direction: TransferDirection,
    ) -> NewTransaction {
        let mut new = match transaction_type {
            TransactionType::Transfer => NewTransaction::transfer_leg(
                scope,
                self.material_id.clone(),
                self.quantity,
                direction,
                counterparty,
            ),
            other => {
                let mut new = NewTransaction::new(scope, self.material_id.clone(), other, self.quantity);
                new.counterparty_scope = Some(counterparty);
                new
            }
        }
        .with_transfer_id(self.transfer_id)
        .with_notes(self.notes.clone());
        new.reference = self.reference.clone();
        new
    }

    fn outgoing(&self) -> NewTransaction {
        self.leg(
            self.source,
            self.destination,
            self.outgoing_type,
            TransferDirection::Outgoing,
        )
    }

    fn incoming(&self) -> NewTransaction {
        self.leg(
            self.destination,
            self.source,
            self.incoming_type,
            TransferDirection::Incoming,
        )
    }

    /// Re-credit the source for a recorded outgoing leg
    fn compensation(&self, outgoing: &Transaction) -> NewTransaction {
        let inverse = match outgoing.transaction_type {
            TransactionType::Allocation => TransactionType::Return,
            other => other,
        };
        let direction = outgoing
            .direction
            .unwrap_or(TransferDirection::Outgoing)
            .reversed();
        let mut new = self.leg(self.source, self.destination, inverse, direction);
        new.reverses = Some(outgoing.id);
        new.notes = Some(format!("compensates {} for transfer {}", outgoing.id, self.transfer_id));
        new
    }
}

/// Traces every state change of one saga
struct Saga {
    transfer_id: Uuid,
    state: TransferState,
}

impl Saga {
    fn start(transfer_id: Uuid) -> Self {
        tracing::debug!(%transfer_id, state = %TransferState::Requested, "transfer requested");
        Self {
            transfer_id,
            state: TransferState::Requested,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(self.state.can_transition_to(next), "{} -> {}", self.state, next);
        tracing::debug!(
            transfer_id = %self.transfer_id,
            from = %self.state,
            to = %next,
            "transfer state changed"
        );
        self.state = next;
    }
}

#[derive(Clone)]
pub struct TransferCoordinator {
    log: TransactionLog,
}

impl TransferCoordinator {
    pub fn new(log: TransactionLog) -> Self {
        Self { log }
    }

    /// Move stock between any two scopes as transfer-out / transfer-in
    pub async fn transfer(&self, request: TransferRequest, actor: Uuid) -> AppResult<TransferReceipt> {
        self.execute(
            TransferPlan {
                transfer_id: Uuid::new_v4(),
                source: request.source,
                destination: request.destination,
                material_id: request.material_id,
                quantity: request.quantity,
                outgoing_type: TransactionType::Transfer,
                incoming_type: TransactionType::Transfer,
                reference: request.reference,
                notes: request.notes,
            },
            actor,
        )
        .await
    }

    /// Warehouse allocation paired with a transfer-in at the vehicle
    pub async fn allocate_to_vehicle(
        &self,
        company_id: Uuid,
        vehicle_id: Uuid,
        material_id: String,
        quantity: Decimal,
        reference: Option<String>,
        actor: Uuid,
    ) -> AppResult<TransferReceipt> {
        self.execute(
            TransferPlan {
                transfer_id: Uuid::new_v4(),
                source: OwnerScope::warehouse(company_id),
                destination: OwnerScope::vehicle(vehicle_id),
                material_id,
                quantity,
                outgoing_type: TransactionType::Allocation,
                incoming_type: TransactionType::Transfer,
                reference,
                notes: None,
            },
            actor,
        )
        .await
    }

    /// Transfer-out at the vehicle paired with a return at the warehouse
    pub async fn return_to_warehouse(
        &self,
        vehicle_id: Uuid,
        company_id: Uuid,
        material_id: String,
        quantity: Decimal,
        reference: Option<String>,
        actor: Uuid,
    ) -> AppResult<TransferReceipt> {
        self.execute(
            TransferPlan {
                transfer_id: Uuid::new_v4(),
                source: OwnerScope::vehicle(vehicle_id),
                destination: OwnerScope::warehouse(company_id),
                material_id,
                quantity,
                outgoing_type: TransactionType::Transfer,
                incoming_type: TransactionType::Return,
                reference,
                notes: None,
            },
            actor,
        )
        .await
    }

    #[tracing::instrument(
        skip(self, plan),
        fields(
            transfer_id = %plan.transfer_id,
            source = %plan.source,
            destination = %plan.destination,
            material_id = %plan.material_id,
            quantity = %plan.quantity
        )
    )]
    async fn execute(&self, plan: TransferPlan, actor: Uuid) -> AppResult<TransferReceipt> {
        validate_positive_quantity(plan.quantity).map_err(|e| AppError::validation("quantity", e))?;
        validate_material_id(&plan.material_id).map_err(|e| AppError::validation("material_id", e))?;
        if plan.source == plan.destination {
            return Err(AppError::validation(
                "destination",
                "Source and destination must differ",
            ));
        }

        let mut saga = Saga::start(plan.transfer_id);

        // an insufficient source fails here with nothing written
        let outgoing = self.log.record(plan.outgoing(), actor).await?;
        saga.advance(TransferState::SourceDebited);

        let incoming = match self.log.record(plan.incoming(), actor).await {
            Ok(entry) => entry,
            Err(err) => return Err(self.compensate(&plan, &mut saga, &outgoing, err, actor).await),
        };
        saga.advance(TransferState::DestCredited);
        saga.advance(TransferState::Committed);

        tracing::info!("transfer committed");

        Ok(TransferReceipt {
            transfer_id: plan.transfer_id,
            state: saga.state,
            outgoing: outgoing.transaction,
            incoming: incoming.transaction,
            source_level: outgoing.level,
            destination_level: incoming.level,
        })
    }

    /// Undo a recorded outgoing leg; returns the error to surface
    async fn compensate(
        &self,
        plan: &TransferPlan,
        saga: &mut Saga,
        outgoing: &LedgerEntry,
        cause: AppError,
        actor: Uuid,
    ) -> AppError {
        saga.advance(TransferState::CompensatingRollback);
        tracing::warn!("destination leg failed, compensating source: {}", cause);

        match self.log.record(plan.compensation(&outgoing.transaction), actor).await {
            Ok(_) => {
                saga.advance(TransferState::Requested);
                cause
            }
            Err(compensation_err) => {
                tracing::error!(
                    "transfer {} left source {} debited; compensation failed: {} (original failure: {})",
                    plan.transfer_id,
                    plan.source,
                    compensation_err,
                    cause
                );
                AppError::IntegrityViolation(format!(
                    "transfer {} could not be compensated; replay repair of {} at {} required",
                    plan.transfer_id, plan.material_id, plan.source
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(outgoing_type: TransactionType, incoming_type: TransactionType) -> TransferPlan {
        TransferPlan {
            transfer_id: Uuid::new_v4(),
            source: OwnerScope::warehouse(Uuid::new_v4()),
            destination: OwnerScope::vehicle(Uuid::new_v4()),
            material_id: "M1".to_string(),
            quantity: Decimal::from(3),
            outgoing_type,
            incoming_type,
            reference: Some("job-12".to_string()),
            notes: None,
        }
    }

    #[test]
    fn legs_mirror_each_other() {
        let plan = plan(TransactionType::Transfer, TransactionType::Transfer);
        let out = plan.outgoing();
        let inc = plan.incoming();
        assert_eq!(out.direction, Some(TransferDirection::Outgoing));
        assert_eq!(inc.direction, Some(TransferDirection::Incoming));
        assert_eq!(out.counterparty_scope, Some(plan.destination));
        assert_eq!(inc.counterparty_scope, Some(plan.source));
        assert_eq!(out.transfer_id, inc.transfer_id);
        assert_eq!(out.reference.as_deref(), Some("job-12"));
    }

    #[test]
    fn allocation_is_compensated_by_return() {
        let plan = plan(TransactionType::Allocation, TransactionType::Transfer);
        let out = plan.outgoing();
        assert_eq!(out.direction, None);
        let recorded = out.into_transaction(None, 2, Uuid::nil(), chrono::Utc::now());

        let comp = plan.compensation(&recorded);
        assert_eq!(comp.transaction_type, TransactionType::Return);
        assert_eq!(comp.scope, plan.source);
        assert_eq!(comp.reverses, Some(recorded.id));
    }

    #[test]
    fn transfer_leg_is_compensated_in_the_opposite_direction() {
        let plan = plan(TransactionType::Transfer, TransactionType::Transfer);
        let recorded = plan
            .outgoing()
            .into_transaction(None, 4, Uuid::nil(), chrono::Utc::now());

        let comp = plan.compensation(&recorded);
        assert_eq!(comp.transaction_type, TransactionType::Transfer);
        assert_eq!(comp.direction, Some(TransferDirection::Incoming));
        assert_eq!(comp.scope, plan.source);
        assert_eq!(comp.counterparty_scope, Some(plan.destination));
        assert_eq!(comp.reverses, Some(recorded.id));
    }

    #[test]
    fn state_machine_allows_only_saga_paths() {
        assert!(TransferState::Requested.can_transition_to(TransferState::SourceDebited));
        assert!(TransferState::SourceDebited.can_transition_to(TransferState::CompensatingRollback));
        assert!(!TransferState::Requested.can_transition_to(TransferState::Committed));
        assert!(!TransferState::DestCredited.can_transition_to(TransferState::CompensatingRollback));
    }
}
