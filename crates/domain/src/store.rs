//! Order storage traits.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};

use crate::Result;
use crate::order::{
    CartItemUpdate, Money, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter, OrderGoods,
    OrderInfo, OrderKey, OrderPage, OrderStatus, ReconciliationRecord, ShoppingCartItem,
};

/// Order, cart and reconciliation storage.
///
/// Reads on the store itself see committed data only. Every write goes
/// through an [`OrderTransaction`] obtained from [`OrderStore::begin`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens a transaction. Dropping it without [`OrderTransaction::commit`]
    /// rolls every staged write back.
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>>;

    /// Loads an order header.
    async fn find_order(&self, key: &OrderKey) -> Result<Option<OrderInfo>>;

    /// Loads the line items of an order.
    async fn order_goods(&self, order_id: OrderId) -> Result<Vec<OrderGoods>>;

    /// Returns one page of a user's orders, newest first, with the number
    /// of orders matching `filter`.
    async fn user_orders(&self, user_id: UserId, filter: &OrderFilter) -> Result<OrderPage>;

    /// Returns the user's cart rows.
    async fn cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>>;

    /// Returns the user's checked cart rows.
    async fn checked_cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>>;

    /// Adds `nums` of a good to the cart, merging into an existing row.
    async fn add_to_cart(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        nums: i32,
        checked: bool,
    ) -> Result<ShoppingCartItem>;

    /// Applies `update` to the user's row for `goods_id`. Returns `None` if
    /// there is no such row.
    async fn update_cart_item(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        update: CartItemUpdate,
    ) -> Result<Option<ShoppingCartItem>>;

    /// Removes the user's row for `goods_id`. Returns false if it was absent.
    async fn delete_cart_item(&self, user_id: UserId, goods_id: GoodsId) -> Result<bool>;

    /// Returns `PAYING` orders whose payment deadline is before `now`.
    async fn expired_paying_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderInfo>>;

    /// Persists a reconciliation record outside any transaction.
    async fn record_reconciliation(&self, record: NewReconciliation)
    -> Result<ReconciliationRecord>;

    /// Returns every reconciliation record, oldest first.
    async fn reconciliations(&self) -> Result<Vec<ReconciliationRecord>>;
}

/// A unit of work over the order tables.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Inserts a draft order and returns it with its id.
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderInfo>;

    /// Inserts line items for an order.
    async fn insert_order_goods(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderGoods],
    ) -> Result<Vec<OrderGoods>>;

    /// Sets the order total.
    async fn set_order_mount(&mut self, order_id: OrderId, order_mount: Money) -> Result<()>;

    /// Returns the user's checked cart rows, locking them until the
    /// transaction ends.
    async fn checked_cart_for_update(&mut self, user_id: UserId)
    -> Result<Vec<ShoppingCartItem>>;

    /// Deletes the cart rows with the given ids, returning how many were
    /// removed.
    async fn delete_cart_items(&mut self, ids: &[i64]) -> Result<u64>;

    /// Loads an order header, locking its row until the transaction ends.
    async fn find_order_for_update(&mut self, key: &OrderKey) -> Result<Option<OrderInfo>>;

    /// Loads the line items of an order inside the transaction.
    async fn order_goods(&mut self, order_id: OrderId) -> Result<Vec<OrderGoods>>;

    /// Moves an order from `from` to `to`, only if it is still in `from`.
    ///
    /// `pay_time`, when given, is stamped in the same write. Returns false
    /// when the order was not in `from` (or no longer exists).
    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        pay_time: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    /// Deletes an order and its line items. Returns false if it was absent.
    async fn delete_order(&mut self, order_id: OrderId) -> Result<bool>;

    /// Makes every staged write visible.
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        (**self).begin().await
    }

    async fn find_order(&self, key: &OrderKey) -> Result<Option<OrderInfo>> {
        (**self).find_order(key).await
    }

    async fn order_goods(&self, order_id: OrderId) -> Result<Vec<OrderGoods>> {
        (**self).order_goods(order_id).await
    }

    async fn user_orders(&self, user_id: UserId, filter: &OrderFilter) -> Result<OrderPage> {
        (**self).user_orders(user_id, filter).await
    }

    async fn cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        (**self).cart(user_id).await
    }

    async fn checked_cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        (**self).checked_cart(user_id).await
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        nums: i32,
        checked: bool,
    ) -> Result<ShoppingCartItem> {
        (**self).add_to_cart(user_id, goods_id, nums, checked).await
    }

    async fn update_cart_item(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        update: CartItemUpdate,
    ) -> Result<Option<ShoppingCartItem>> {
        (**self).update_cart_item(user_id, goods_id, update).await
    }

    async fn delete_cart_item(&self, user_id: UserId, goods_id: GoodsId) -> Result<bool> {
        (**self).delete_cart_item(user_id, goods_id).await
    }

    async fn expired_paying_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderInfo>> {
        (**self).expired_paying_orders(now).await
    }

    async fn record_reconciliation(
        &self,
        record: NewReconciliation,
    ) -> Result<ReconciliationRecord> {
        (**self).record_reconciliation(record).await
    }

    async fn reconciliations(&self) -> Result<Vec<ReconciliationRecord>> {
        (**self).reconciliations().await
    }
}
