//! Material catalog and assembly bills of materials

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A stocked material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub name: String,
    pub unit_cost: Decimal,
    pub default_waste_factor: Option<Decimal>,
    pub category: Option<String>,
}

/// One material requirement of an assembly, per installed unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillOfMaterialsLine {
    pub material_id: String,
    /// Per-unit quantity
    pub quantity: Decimal,
    /// Overrides the material's default waste factor
    #[serde(default)]
    pub waste_factor: Option<Decimal>,
}

/// A catalog assembly (e.g. "duplex receptacle, rough-in")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: String,
    pub phase: Option<String>,
    pub materials: Vec<BillOfMaterialsLine>,
}

impl Assembly {
    /// Boundary check before the assembly enters takeoff math
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Assembly id is required".to_string());
        }
        for line in &self.materials {
            if line.material_id.trim().is_empty() {
                return Err(format!("Assembly {} has a line without a material id", self.id));
            }
            if line.quantity < Decimal::ZERO {
                return Err(format!(
                    "Assembly {} has a negative quantity for {}",
                    self.id, line.material_id
                ));
            }
            crate::validation::validate_quantity_range(line.quantity)
                .map_err(|e| format!("Assembly {} line {}: {}", self.id, line.material_id, e))?;
            if let Some(factor) = line.waste_factor {
                crate::validation::validate_waste_factor(factor)
                    .map_err(|e| format!("Assembly {}: {}", self.id, e))?;
            }
        }
        Ok(())
    }
}

impl Material {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Material id is required".to_string());
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(format!("Material {} has a negative unit cost", self.id));
        }
        crate::validation::validate_quantity_range(self.unit_cost)
            .map_err(|e| format!("Material {} unit cost: {}", self.id, e))?;
        if let Some(factor) = self.default_waste_factor {
            crate::validation::validate_waste_factor(factor)
                .map_err(|e| format!("Material {}: {}", self.id, e))?;
        }
        Ok(())
    }
}
