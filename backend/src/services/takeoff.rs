//! Material takeoffs: estimate → netted purchase plan → stock allocation

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute, fingerprint, CatalogLookup, CatalogSnapshot, Estimate, MaterialTakeoff, MissingAssemblyPolicy,
    NewTransaction, OwnerScope, TakeoffStatus, Transaction, TransactionType,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::transaction_log::TransactionLog;
use crate::store::{CatalogSource, EstimateSource, InventoryStore, StoreError, TakeoffStore};

/// Options for generating a takeoff
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateTakeoffInput {
    /// Overrides the configured policy for this takeoff
    #[serde(default)]
    pub missing_assembly_policy: Option<MissingAssemblyPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTakeoffStatusInput {
    pub status: TakeoffStatus,
}

/// A takeoff after its stock was drawn from the ledger
#[derive(Debug, Clone, Serialize)]
pub struct TakeoffAllocation {
    pub takeoff: MaterialTakeoff,
    pub transactions: Vec<Transaction>,
}

#[derive(Clone)]
pub struct TakeoffService {
    takeoffs: Arc<dyn TakeoffStore>,
    catalog: Arc<dyn CatalogSource>,
    estimates: Arc<dyn EstimateSource>,
    levels: Arc<dyn InventoryStore>,
    log: TransactionLog,
    default_policy: MissingAssemblyPolicy,
}

impl TakeoffService {
    pub fn new(
        takeoffs: Arc<dyn TakeoffStore>,
        catalog: Arc<dyn CatalogSource>,
        estimates: Arc<dyn EstimateSource>,
        levels: Arc<dyn InventoryStore>,
        log: TransactionLog,
        default_policy: MissingAssemblyPolicy,
    ) -> Self {
        Self {
            takeoffs,
            catalog,
            estimates,
            levels,
            log,
            default_policy,
        }
    }

    /// Compute and persist the takeoff for a project's current estimate,
    /// netted against the company warehouse.
    ///
    /// One takeoff exists per estimate; asking again returns it unchanged.
    #[tracing::instrument(skip(self, input))]
    pub async fn generate(
        &self,
        company_id: Uuid,
        project_id: Uuid,
        actor: Uuid,
        input: GenerateTakeoffInput,
    ) -> AppResult<MaterialTakeoff> {
        let estimate = self
            .estimates
            .get_estimate(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Estimate for project {}", project_id)))?;

        if let Some(existing) = self.takeoffs.find_takeoff(project_id, estimate.id).await? {
            tracing::debug!(takeoff_id = %existing.id, "takeoff already generated for estimate");
            return Ok(existing);
        }

        let stock_scope = OwnerScope::warehouse(company_id);
        let catalog = self.catalog_snapshot(&estimate).await?;
        let stock: BTreeMap<String, Decimal> = self
            .levels
            .list_levels(&stock_scope)
            .await?
            .into_iter()
            .map(|level| (level.material_id, level.current_quantity))
            .collect();

        let policy = input.missing_assembly_policy.unwrap_or(self.default_policy);
        let plan = compute(&estimate, &catalog, &stock, policy)?;
        for skipped in &plan.skipped_items {
            tracing::warn!(
                room = %skipped.room,
                item = skipped.item,
                assembly_id = %skipped.assembly_id,
                "estimate line skipped: {}",
                skipped.reason
            );
        }

        let now = Utc::now();
        let takeoff = MaterialTakeoff {
            id: Uuid::new_v4(),
            project_id,
            estimate_id: estimate.id,
            estimate_version: estimate.version,
            stock_scope,
            status: TakeoffStatus::Draft,
            fingerprint: fingerprint(&plan),
            lines: plan.lines,
            skipped_items: plan.skipped_items,
            total_cost: plan.total_cost,
            total_purchase_cost: plan.total_purchase_cost,
            created_at: now,
            created_by: actor,
            updated_at: now,
        };

        match self.takeoffs.insert_takeoff(&takeoff).await {
            Ok(()) => {}
            Err(StoreError::DuplicateTakeoff(_)) => {
                // a concurrent request generated it first
                return self
                    .takeoffs
                    .find_takeoff(project_id, estimate.id)
                    .await?
                    .ok_or_else(|| AppError::Conflict("takeoff generation raced".to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            takeoff_id = %takeoff.id,
            lines = takeoff.lines.len(),
            skipped = takeoff.skipped_items.len(),
            total_cost = %takeoff.total_cost,
            purchase_cost = %takeoff.total_purchase_cost,
            "takeoff generated"
        );
        Ok(takeoff)
    }

    /// Fetch every assembly and material the estimate can reach
    async fn catalog_snapshot(&self, estimate: &Estimate) -> AppResult<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::new();
        for assembly_id in estimate.assembly_ids() {
            let Some(assembly) = self.catalog.get_assembly(&assembly_id).await? else {
                continue;
            };
            for line in &assembly.materials {
                if snapshot.material(&line.material_id).is_some() {
                    continue;
                }
                if let Some(material) = self.catalog.get_material(&line.material_id).await? {
                    snapshot.insert_material(material);
                }
            }
            snapshot.insert_assembly(assembly);
        }
        Ok(snapshot)
    }

    pub async fn get(&self, takeoff_id: Uuid) -> AppResult<MaterialTakeoff> {
        self.takeoffs
            .get_takeoff(takeoff_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Takeoff {}", takeoff_id)))
    }

    /// Newest first
    pub async fn list(&self, project_id: Uuid) -> AppResult<Vec<MaterialTakeoff>> {
        Ok(self.takeoffs.list_takeoffs(project_id).await?)
    }

    /// Move a takeoff through draft / approved / cancelled.
    ///
    /// `allocated` is only reachable through [`allocate`](Self::allocate).
    pub async fn update_status(&self, takeoff_id: Uuid, to: TakeoffStatus) -> AppResult<MaterialTakeoff> {
        let takeoff = self.get(takeoff_id).await?;
        if to == TakeoffStatus::Allocated {
            return Err(AppError::InvalidStateTransition(
                "Takeoffs become allocated by allocating their stock".to_string(),
            ));
        }
        self.transition(takeoff, to).await
    }

    async fn transition(&self, mut takeoff: MaterialTakeoff, to: TakeoffStatus) -> AppResult<MaterialTakeoff> {
        let from = takeoff.status;
        if !from.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition(format!(
                "Cannot move takeoff from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let now = Utc::now();
        if !self.takeoffs.update_takeoff_status(takeoff.id, from, to, now).await? {
            return Err(AppError::Conflict(format!(
                "Takeoff {} changed status concurrently",
                takeoff.id
            )));
        }
        tracing::info!(takeoff_id = %takeoff.id, from = from.as_str(), to = to.as_str(), "takeoff status changed");

        takeoff.status = to;
        takeoff.updated_at = now;
        Ok(takeoff)
    }

    /// Draw the planned stock from the warehouse ledger.
    ///
    /// Each line's `allocated_from_stock` becomes an allocation entry. If any
    /// line cannot be allocated, the lines already drawn are returned and the
    /// takeoff stays approved.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(&self, takeoff_id: Uuid, actor: Uuid) -> AppResult<TakeoffAllocation> {
        let takeoff = self.get(takeoff_id).await?;
        if !takeoff.status.can_transition_to(TakeoffStatus::Allocated) {
            return Err(AppError::InvalidStateTransition(format!(
                "Only approved takeoffs can be allocated; this one is {}",
                takeoff.status.as_str()
            )));
        }

        let reference = format!("takeoff:{}", takeoff.id);
        let mut recorded: Vec<Transaction> = Vec::new();

        for line in takeoff.lines.iter().filter(|l| l.allocated_from_stock > Decimal::ZERO) {
            let new = NewTransaction::new(
                takeoff.stock_scope,
                line.material_id.clone(),
                TransactionType::Allocation,
                line.allocated_from_stock,
            )
            .with_reference(reference.clone());

            match self.log.append(new, actor).await {
                Ok(transaction) => recorded.push(transaction),
                Err(err) => {
                    tracing::warn!(
                        material_id = %line.material_id,
                        "takeoff allocation failed, returning {} drawn lines: {}",
                        recorded.len(),
                        err
                    );
                    self.return_drawn(&recorded, &reference, actor).await?;
                    return Err(err);
                }
            }
        }

        let takeoff = match self.transition(takeoff, TakeoffStatus::Allocated).await {
            Ok(takeoff) => takeoff,
            Err(err) => {
                self.return_drawn(&recorded, &reference, actor).await?;
                return Err(err);
            }
        };

        tracing::info!(lines = recorded.len(), "takeoff stock allocated");
        Ok(TakeoffAllocation {
            takeoff,
            transactions: recorded,
        })
    }

    async fn return_drawn(&self, drawn: &[Transaction], reference: &str, actor: Uuid) -> AppResult<()> {
        for allocation in drawn {
            let mut new = NewTransaction::new(
                allocation.scope,
                allocation.material_id.clone(),
                TransactionType::Return,
                allocation.quantity,
            )
            .with_reference(reference);
            new.reverses = Some(allocation.id);

            if let Err(err) = self.log.append(new, actor).await {
                tracing::error!(
                    allocation_id = %allocation.id,
                    "could not return allocated stock: {}",
                    err
                );
                return Err(AppError::IntegrityViolation(format!(
                    "allocation {} for {} could not be returned; replay repair required",
                    allocation.id, reference
                )));
            }
        }
        Ok(())
    }
}
