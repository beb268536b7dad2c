//! Order flows that span the order store and the inventory.
//!
//! - [`OrderSaga`] creates an order from a cart, reserving stock and
//!   returning it if any later step fails
//! - [`OrderLifecycle`] updates and deletes existing orders under the
//!   status machine
//! - [`TimeoutReaper`] closes unpaid orders past their deadline

mod compensation;
pub mod error;
pub mod lifecycle;
pub mod order_create;
pub mod order_view;
pub mod reaper;
pub mod services;

pub use error::{Result, SagaError};
pub use lifecycle::{LifecycleConfig, OrderLifecycle};
pub use order_create::{CreateOrderRequest, OrderSaga, OrderSagaConfig};
pub use order_view::OrderDetail;
pub use reaper::{ReapReport, ReaperConfig, TimeoutReaper};
pub use services::{
    CatalogService, FaultyInventory, GoodsInfo, InMemoryCatalogService, InMemoryUserDirectory,
    InventoryClient, UserDirectory, stock_lines,
};
