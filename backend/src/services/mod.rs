//! Business logic services for the inventory ledger

pub mod csv_io;
pub mod level_store;
pub mod takeoff;
pub mod transaction_log;
pub mod transfer;

pub use csv_io::CsvService;
pub use level_store::LevelStore;
pub use takeoff::TakeoffService;
pub use transaction_log::TransactionLog;
pub use transfer::TransferCoordinator;
