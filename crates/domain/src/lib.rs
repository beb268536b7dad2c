//! Order domain for the order service.
//!
//! This crate provides:
//! - `OrderStatus`, the order status machine
//! - order, line item, cart and reconciliation records
//! - `OrderStore`/`OrderTransaction` with in-memory and PostgreSQL backends

pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod store;

pub use error::{DomainError, Result};
pub use memory::InMemoryOrderStore;
pub use order::{
    CartItemUpdate, Money, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter, OrderGoods,
    OrderInfo, OrderKey, OrderPage, OrderStatus, ReconciliationLine, ReconciliationRecord,
    ShoppingCartItem, UnknownStatus, generate_order_sn,
};
pub use postgres::PostgresOrderStore;
pub use store::{OrderStore, OrderTransaction};
