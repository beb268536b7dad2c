//! Order records, status machine and value objects.

mod model;
mod state;
mod value_objects;

pub use model::{
    CartItemUpdate, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter, OrderGoods,
    OrderInfo, OrderKey, OrderPage, ReconciliationLine, ReconciliationRecord, ShoppingCartItem,
};
pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::{Money, generate_order_sn};
