//! Takeoff computation: turns an estimate's bill of materials into a
//! purchase/allocation plan netted against current stock.
//!
//! [`compute`] is pure. Given the same estimate, catalog snapshot and stock
//! snapshot it produces the same [`TakeoffPlan`], down to the serialized
//! bytes, which is what [`fingerprint`] hashes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{Assembly, Estimate, Material, SkippedLineItem, TakeoffLine, TakeoffPlan};

/// Read access to assemblies and materials
pub trait CatalogLookup {
    fn assembly(&self, assembly_id: &str) -> Option<&Assembly>;
    fn material(&self, material_id: &str) -> Option<&Material>;
}

/// Read access to quantity-on-hand per material
pub trait StockLookup {
    fn on_hand(&self, material_id: &str) -> Decimal;
}

impl StockLookup for BTreeMap<String, Decimal> {
    fn on_hand(&self, material_id: &str) -> Decimal {
        self.get(material_id).copied().unwrap_or(Decimal::ZERO)
    }
}

impl StockLookup for HashMap<String, Decimal> {
    fn on_hand(&self, material_id: &str) -> Decimal {
        self.get(material_id).copied().unwrap_or(Decimal::ZERO)
    }
}

/// A frozen copy of the catalog entries a takeoff needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub assemblies: BTreeMap<String, Assembly>,
    #[serde(default)]
    pub materials: BTreeMap<String, Material>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_assembly(&mut self, assembly: Assembly) {
        self.assemblies.insert(assembly.id.clone(), assembly);
    }

    pub fn insert_material(&mut self, material: Material) {
        self.materials.insert(material.id.clone(), material);
    }

    pub fn with_assembly(mut self, assembly: Assembly) -> Self {
        self.insert_assembly(assembly);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.insert_material(material);
        self
    }

    /// Boundary check of every entry
    pub fn validate(&self) -> Result<(), String> {
        for assembly in self.assemblies.values() {
            assembly.validate()?;
        }
        for material in self.materials.values() {
            material.validate()?;
        }
        Ok(())
    }
}

impl CatalogLookup for CatalogSnapshot {
    fn assembly(&self, assembly_id: &str) -> Option<&Assembly> {
        self.assemblies.get(assembly_id)
    }

    fn material(&self, material_id: &str) -> Option<&Material> {
        self.materials.get(material_id)
    }
}

/// What to do with an estimate line whose assembly is not in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAssemblyPolicy {
    /// Abort the whole computation
    #[default]
    Fail,
    /// Leave the line out and report it in `skipped_items`
    Skip,
}

impl MissingAssemblyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingAssemblyPolicy::Fail => "fail",
            MissingAssemblyPolicy::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("invalid estimate: {0}")]
    InvalidEstimate(String),

    #[error("invalid catalog entry: {0}")]
    InvalidCatalog(String),

    #[error("assembly {assembly_id} not found (room '{room}', item {item})")]
    AssemblyNotFound {
        assembly_id: String,
        room: String,
        item: usize,
    },

    #[error("material {material_id} referenced by assembly {assembly_id} not found")]
    MaterialNotFound {
        material_id: String,
        assembly_id: String,
    },

    #[error("quantities for material {0} exceed the supported range")]
    QuantityOverflow(String),
}

#[derive(Debug, Default)]
struct Requirement {
    raw_quantity: Decimal,
    waste_factor: Decimal,
    phases: BTreeSet<String>,
}

/// Compute the netted material plan for an estimate.
pub fn compute(
    estimate: &Estimate,
    catalog: &impl CatalogLookup,
    stock: &impl StockLookup,
    policy: MissingAssemblyPolicy,
) -> Result<TakeoffPlan, AllocationError> {
    estimate.validate().map_err(AllocationError::InvalidEstimate)?;

    // BTreeMap keeps output ordered by material id
    let mut requirements: BTreeMap<String, Requirement> = BTreeMap::new();
    let mut skipped_items = Vec::new();

    for room in &estimate.rooms {
        for (idx, item) in room.items.iter().enumerate() {
            let Some(assembly) = catalog.assembly(&item.assembly_id) else {
                match policy {
                    MissingAssemblyPolicy::Fail => {
                        return Err(AllocationError::AssemblyNotFound {
                            assembly_id: item.assembly_id.clone(),
                            room: room.name.clone(),
                            item: idx + 1,
                        });
                    }
                    MissingAssemblyPolicy::Skip => {
                        skipped_items.push(SkippedLineItem {
                            room: room.name.clone(),
                            item: idx + 1,
                            assembly_id: item.assembly_id.clone(),
                            reason: "assembly not found in catalog".to_string(),
                        });
                        continue;
                    }
                }
            };
            assembly.validate().map_err(AllocationError::InvalidCatalog)?;

            for line in &assembly.materials {
                let material = catalog.material(&line.material_id).ok_or_else(|| {
                    AllocationError::MaterialNotFound {
                        material_id: line.material_id.clone(),
                        assembly_id: assembly.id.clone(),
                    }
                })?;
                let factor = line
                    .waste_factor
                    .or(material.default_waste_factor)
                    .unwrap_or(Decimal::ONE);

                let overflow = || AllocationError::QuantityOverflow(line.material_id.clone());
                let entry = requirements.entry(line.material_id.clone()).or_default();
                entry.raw_quantity = line
                    .quantity
                    .checked_mul(item.quantity)
                    .and_then(|q| entry.raw_quantity.checked_add(q))
                    .ok_or_else(overflow)?;
                // conflicting factors for one material: the largest wins
                entry.waste_factor = entry.waste_factor.max(factor);
                if let Some(phase) = &assembly.phase {
                    entry.phases.insert(phase.clone());
                }
            }
        }
    }

    let mut lines = Vec::with_capacity(requirements.len());
    let mut total_cost = Decimal::ZERO;
    let mut total_purchase_cost = Decimal::ZERO;

    for (material_id, requirement) in requirements {
        let material = catalog
            .material(&material_id)
            .ok_or_else(|| AllocationError::MaterialNotFound {
                material_id: material_id.clone(),
                assembly_id: String::new(),
            })?;
        material.validate().map_err(AllocationError::InvalidCatalog)?;

        let overflow = || AllocationError::QuantityOverflow(material_id.clone());
        let adjusted_quantity = requirement
            .raw_quantity
            .checked_mul(requirement.waste_factor)
            .ok_or_else(overflow)?
            .ceil();
        let unit_cost = material.unit_cost;
        let on_hand = stock.on_hand(&material_id).max(Decimal::ZERO);
        let allocated_from_stock = on_hand.min(adjusted_quantity);
        let purchase_needed = (adjusted_quantity - allocated_from_stock).max(Decimal::ZERO);
        let line_total = adjusted_quantity.checked_mul(unit_cost).ok_or_else(overflow)?;
        let purchase_cost = purchase_needed.checked_mul(unit_cost).ok_or_else(overflow)?;

        total_cost = total_cost.checked_add(line_total).ok_or_else(overflow)?;
        total_purchase_cost = total_purchase_cost
            .checked_add(purchase_cost)
            .ok_or_else(overflow)?;

        lines.push(TakeoffLine {
            material_id,
            name: material.name.clone(),
            category: material.category.clone(),
            phases: requirement.phases.into_iter().collect(),
            raw_quantity: requirement.raw_quantity.normalize(),
            waste_factor: requirement.waste_factor.normalize(),
            adjusted_quantity: adjusted_quantity.normalize(),
            unit_cost: unit_cost.normalize(),
            total_cost: line_total.normalize(),
            allocated_from_stock: allocated_from_stock.normalize(),
            purchase_needed: purchase_needed.normalize(),
            purchase_cost: purchase_cost.normalize(),
        });
    }

    Ok(TakeoffPlan {
        lines,
        skipped_items,
        total_cost: total_cost.normalize(),
        total_purchase_cost: total_purchase_cost.normalize(),
    })
}

/// SHA-256 of the plan's canonical JSON, lowercase hex
pub fn fingerprint(plan: &TakeoffPlan) -> String {
    let bytes = serde_json::to_vec(plan).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    format!("{:x}", digest)
}
