//! Per-good stock counters and the service that sells and rebacks them.
//!
//! Every mutation runs under a [`locks::BatchLockManager`] covering all the
//! goods it touches, and is applied through a version compare-and-swap so a
//! race that slips past the lock still cannot lose an update.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod service;

pub use error::{InventoryError, Result};
pub use ledger::StockLedger;
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use record::{StockLine, StockRecord, StockUpdate};
pub use service::{InventoryConfig, InventoryService};
