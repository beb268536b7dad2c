//! Collaborator traits and in-memory implementations for the order flows.

pub mod catalog;
pub mod inventory;
pub mod user;

pub use catalog::{CatalogService, GoodsInfo, InMemoryCatalogService};
pub use inventory::{FaultyInventory, InventoryClient, stock_lines};
pub use user::{InMemoryUserDirectory, UserDirectory};
