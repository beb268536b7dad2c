//! Lock key namespaces. Every lock in the system is built here so the
//! namespaces can never collide.

use common::{GoodsId, OrderId, UserId};

/// Lock guarding the stock row of one good.
pub fn inventory(goods_id: GoodsId) -> String {
    format!("inventory:lock:{goods_id}")
}

/// Lock serializing order submissions of one user.
pub fn order_create(user_id: UserId) -> String {
    format!("order_create_lock:{user_id}")
}

/// Lock serializing status updates of an order addressed by id.
pub fn order_update_by_id(order_id: OrderId) -> String {
    format!("order_update_lock:id:{order_id}")
}

/// Lock serializing status updates of an order addressed by order number.
pub fn order_update_by_sn(order_sn: &str) -> String {
    format!("order_update_lock:sn:{order_sn}")
}

/// Lock serializing deletion of an order.
pub fn order_delete(order_id: OrderId) -> String {
    format!("order_delete_lock:{order_id}")
}
