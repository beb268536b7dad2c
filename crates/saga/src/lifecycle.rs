//! Status updates, deletion and lookups of existing orders.

use std::time::Duration;

use chrono::Utc;
use common::{OrderId, UserId};
use domain::{
    OrderFilter, OrderInfo, OrderKey, OrderPage, OrderStatus, OrderStore, OrderTransaction,
};
use locks::{DistributedLock, LockStore, RetryPolicy, keys};

use crate::compensation::take_back_returned_stock;
use crate::error::{Result, SagaError};
use crate::order_view::OrderDetail;
use crate::services::{InventoryClient, stock_lines};

/// Tuning knobs for [`OrderLifecycle`].
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub update_lock_ttl: Duration,
    pub update_lock_retry: RetryPolicy,
    pub delete_lock_ttl: Duration,
    pub delete_lock_retry: RetryPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            update_lock_ttl: Duration::from_secs(10),
            update_lock_retry: RetryPolicy::new(3, Duration::from_millis(50)),
            delete_lock_ttl: Duration::from_secs(15),
            delete_lock_retry: RetryPolicy::new(3, Duration::from_millis(50)),
        }
    }
}

/// Guards every change to an existing order with the status machine and a
/// per-order lock.
pub struct OrderLifecycle<L, O, I> {
    locks: L,
    store: O,
    inventory: I,
    config: LifecycleConfig,
}

impl<L, O, I> OrderLifecycle<L, O, I>
where
    L: LockStore + Clone,
    O: OrderStore,
    I: InventoryClient,
{
    /// Creates a lifecycle service with default configuration.
    pub fn new(locks: L, store: O, inventory: I) -> Self {
        Self::with_config(locks, store, inventory, LifecycleConfig::default())
    }

    /// Creates a lifecycle service with explicit configuration.
    pub fn with_config(locks: L, store: O, inventory: I, config: LifecycleConfig) -> Self {
        Self {
            locks,
            store,
            inventory,
            config,
        }
    }

    /// Moves an order to `status`.
    ///
    /// Asking for the current status is a no-op. Entering `TRADE_SUCCESS`
    /// stamps the payment time; entering `TRADE_CLOSED` returns the order's
    /// stock before the status change commits, and a failed reback leaves
    /// the order untouched. If the commit fails after the reback, the stock
    /// is reserved again.
    #[tracing::instrument(skip(self), fields(order = %key, to = %status))]
    pub async fn update_status(&self, key: OrderKey, status: OrderStatus) -> Result<OrderInfo> {
        let lock_key = match &key {
            OrderKey::Id(id) => keys::order_update_by_id(*id),
            OrderKey::Sn(sn) => keys::order_update_by_sn(sn),
        };
        let lock = DistributedLock::new(self.locks.clone(), lock_key, self.config.update_lock_ttl);
        if !lock.try_acquire(self.config.update_lock_retry).await? {
            return Err(SagaError::Busy {
                key: lock.key().to_string(),
            });
        }

        let result = self.update_locked(&key, status).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(key = lock.key(), error = %e, "failed to release order lock");
        }
        result
    }

    async fn update_locked(&self, key: &OrderKey, status: OrderStatus) -> Result<OrderInfo> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order_for_update(key)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(key.clone()))?;

        if order.status == status {
            return Ok(order);
        }
        if !order.status.can_transition_to(status) {
            return Err(SagaError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        let pay_time = (status == OrderStatus::TradeSuccess).then(Utc::now);
        if !tx
            .transition_status(order.id, order.status, status, pay_time)
            .await?
        {
            return Err(SagaError::Conflict(order.id));
        }

        let returned = if status == OrderStatus::TradeClosed {
            stock_lines(&tx.order_goods(order.id).await?)
        } else {
            Vec::new()
        };
        if !returned.is_empty() {
            self.inventory.reback(&returned).await?;
        }

        if let Err(e) = tx.commit().await {
            if !returned.is_empty() {
                take_back_returned_stock(
                    &self.inventory,
                    &self.store,
                    &order.order_sn,
                    &returned,
                    &e.to_string(),
                )
                .await;
            }
            return Err(e.into());
        }

        tracing::info!(order_sn = %order.order_sn, from = %order.status, "order status updated");
        Ok(OrderInfo {
            status,
            pay_time: pay_time.or(order.pay_time),
            ..order
        })
    }

    /// Deletes an order and its line items.
    ///
    /// Only `WAIT_BUYER_PAY`, `PAYING` and `TRADE_CLOSED` orders can be
    /// deleted. When `user_id` is given the order must belong to that user.
    /// Orders still holding stock have it returned first.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: OrderId, user_id: Option<UserId>) -> Result<()> {
        let lock = DistributedLock::new(
            self.locks.clone(),
            keys::order_delete(order_id),
            self.config.delete_lock_ttl,
        );
        if !lock.try_acquire(self.config.delete_lock_retry).await? {
            return Err(SagaError::Busy {
                key: lock.key().to_string(),
            });
        }

        let result = self.delete_locked(order_id, user_id).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(key = lock.key(), error = %e, "failed to release order lock");
        }
        result
    }

    async fn delete_locked(&self, order_id: OrderId, user_id: Option<UserId>) -> Result<()> {
        let key = OrderKey::Id(order_id);
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order_for_update(&key)
            .await?
            .filter(|o| user_id.is_none_or(|u| o.user_id == u))
            .ok_or_else(|| SagaError::OrderNotFound(key.clone()))?;

        if !order.status.is_deletable() {
            return Err(SagaError::NotDeletable(order.status));
        }

        let lines = stock_lines(&tx.order_goods(order_id).await?);
        if !tx.delete_order(order_id).await? {
            return Err(SagaError::OrderNotFound(key));
        }

        let returned = order.status.holds_stock() && !lines.is_empty();
        if returned {
            self.inventory.reback(&lines).await?;
        }

        if let Err(e) = tx.commit().await {
            if returned {
                take_back_returned_stock(
                    &self.inventory,
                    &self.store,
                    &order.order_sn,
                    &lines,
                    &e.to_string(),
                )
                .await;
            }
            return Err(e.into());
        }

        tracing::info!(order_sn = %order.order_sn, status = %order.status, "order deleted");
        Ok(())
    }

    /// Loads an order with its line items. When `user_id` is given the
    /// order must belong to that user.
    pub async fn order_detail(
        &self,
        order_id: OrderId,
        user_id: Option<UserId>,
    ) -> Result<OrderDetail> {
        let key = OrderKey::Id(order_id);
        let order = self
            .store
            .find_order(&key)
            .await?
            .filter(|o| user_id.is_none_or(|u| o.user_id == u))
            .ok_or(SagaError::OrderNotFound(key))?;
        let lines = self.store.order_goods(order.id).await?;
        Ok(OrderDetail { order, lines })
    }

    /// Lists one page of a user's orders, newest first.
    pub async fn list_orders(&self, user_id: UserId, filter: OrderFilter) -> Result<OrderPage> {
        Ok(self.store.user_orders(user_id, &filter).await?)
    }
}
