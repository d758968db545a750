//! Owner scopes: whose stock a level or transaction belongs to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stock owner: a company warehouse or a service vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerScope {
    /// Warehouse stock, keyed by the owning company
    Warehouse(Uuid),
    Vehicle(Uuid),
}

/// Discriminant of an [`OwnerScope`], used for storage columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Warehouse,
    Vehicle,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Warehouse => "warehouse",
            ScopeKind::Vehicle => "vehicle",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warehouse" => Some(ScopeKind::Warehouse),
            "vehicle" => Some(ScopeKind::Vehicle),
            _ => None,
        }
    }
}

impl OwnerScope {
    pub fn warehouse(company_id: Uuid) -> Self {
        OwnerScope::Warehouse(company_id)
    }

    pub fn vehicle(vehicle_id: Uuid) -> Self {
        OwnerScope::Vehicle(vehicle_id)
    }

    pub fn kind(&self) -> ScopeKind {
        match self {
            OwnerScope::Warehouse(_) => ScopeKind::Warehouse,
            OwnerScope::Vehicle(_) => ScopeKind::Vehicle,
        }
    }

    /// Company id for warehouses, vehicle id for vehicles
    pub fn id(&self) -> Uuid {
        match self {
            OwnerScope::Warehouse(id) | OwnerScope::Vehicle(id) => *id,
        }
    }

    pub fn from_parts(kind: ScopeKind, id: Uuid) -> Self {
        match kind {
            ScopeKind::Warehouse => OwnerScope::Warehouse(id),
            ScopeKind::Vehicle => OwnerScope::Vehicle(id),
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, OwnerScope::Vehicle(_))
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.id())
    }
}

/// Error parsing a `kind:uuid` scope key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid owner scope '{0}', expected warehouse:<uuid> or vehicle:<uuid>")]
pub struct ParseScopeError(pub String);

impl FromStr for OwnerScope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| ParseScopeError(s.to_string()))?;
        let kind = ScopeKind::from_str(kind.trim()).ok_or_else(|| ParseScopeError(s.to_string()))?;
        let id = Uuid::parse_str(id.trim()).map_err(|_| ParseScopeError(s.to_string()))?;
        Ok(OwnerScope::from_parts(kind, id))
    }
}
