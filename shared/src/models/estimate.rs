//! Project estimates

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced estimate for a project; each revision has its own id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default = "default_version")]
    pub version: i32,
    pub rooms: Vec<EstimateRoom>,
}

fn default_version() -> i32 {
    1
}

/// A room or section of an estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRoom {
    #[serde(default)]
    pub name: String,
    pub items: Vec<EstimateLineItem>,
}

/// A counted installation of one assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateLineItem {
    pub assembly_id: String,
    pub quantity: Decimal,
}

impl Estimate {
    /// Boundary check before the estimate enters takeoff math
    pub fn validate(&self) -> Result<(), String> {
        for (room_idx, room) in self.rooms.iter().enumerate() {
            for (item_idx, item) in room.items.iter().enumerate() {
                if item.assembly_id.trim().is_empty() {
                    return Err(format!(
                        "Room {} item {} has no assembly id",
                        room_idx + 1,
                        item_idx + 1
                    ));
                }
                if item.quantity < Decimal::ZERO {
                    return Err(format!(
                        "Room {} item {} has a negative quantity",
                        room_idx + 1,
                        item_idx + 1
                    ));
                }
                crate::validation::validate_quantity_range(item.quantity)
                    .map_err(|e| format!("Room {} item {}: {}", room_idx + 1, item_idx + 1, e))?;
            }
        }
        Ok(())
    }

    /// Distinct assembly ids in first-seen order
    pub fn assembly_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for item in self.rooms.iter().flat_map(|r| r.items.iter()) {
            if !ids.contains(&item.assembly_id) {
                ids.push(item.assembly_id.clone());
            }
        }
        ids
    }
}
