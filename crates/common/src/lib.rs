//! Shared identifier types used across the inventory, order and saga crates.

pub mod types;

pub use types::{GoodsId, OrderId, UserId};
