//! HTTP request handlers

pub mod bulk;
pub mod health;
pub mod inventory;
pub mod takeoff;
pub mod transfer;

pub use bulk::*;
pub use health::*;
pub use inventory::*;
pub use takeoff::*;
pub use transfer::*;
