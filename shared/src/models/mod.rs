//! Domain models for the inventory ledger

mod catalog;
mod estimate;
mod level;
mod scope;
mod takeoff;
mod transaction;

pub use catalog::*;
pub use estimate::*;
pub use level::*;
pub use scope::*;
pub use takeoff::*;
pub use transaction::*;
