//! Shared types and pure logic for the contractor inventory ledger
//!
//! This crate contains the domain model, ledger arithmetic and takeoff
//! computation shared between the backend and the browser (via WASM).
//! It performs no I/O.

pub mod allocation;
pub mod ledger;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::{
    compute, fingerprint, AllocationError, CatalogLookup, CatalogSnapshot, MissingAssemblyPolicy,
    StockLookup,
};
pub use ledger::{Effect, LedgerError};
pub use models::*;
pub use types::*;
pub use validation::*;
