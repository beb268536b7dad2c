//! The order creation saga.
//!
//! Steps, all under the per-user `order_create_lock`:
//! 1. Open a transaction and lock the user's checked cart rows
//! 2. Insert a draft order
//! 3. Look up every good in the catalog with one batch call
//! 4. Reserve stock with a single inventory sell
//! 5. Insert the line items, set the total, clear the consumed cart rows, commit
//!
//! Stock reserved in step 4 is outside the local transaction. If anything
//! after it fails, the saga returns the stock with a reback; if that fails
//! too, a reconciliation record is written for an operator.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use common::{GoodsId, UserId};
use domain::{
    Money, NewOrder, NewOrderGoods, NewReconciliation, OrderInfo, OrderStatus, OrderStore,
    OrderTransaction, ShoppingCartItem, generate_order_sn,
};
use inventory::StockLine;
use locks::{DistributedLock, LockStore, RetryPolicy, keys};
use serde::{Deserialize, Serialize};

use crate::compensation::reconciliation_lines;
use crate::error::{Result, SagaError};
use crate::order_view::OrderDetail;
use crate::services::{CatalogService, GoodsInfo, InventoryClient, UserDirectory};

/// Tuning knobs for [`OrderSaga`].
#[derive(Debug, Clone, Copy)]
pub struct OrderSagaConfig {
    /// TTL of the per-user lock. Must exceed the worst-case saga latency,
    /// since the lock is not renewed.
    pub lock_ttl: Duration,
    /// Retry budget for taking the per-user lock.
    pub lock_retry: RetryPolicy,
    /// How long a new order may stay unpaid.
    pub payment_window: Duration,
}

impl Default for OrderSagaConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            lock_retry: RetryPolicy::new(3, Duration::from_millis(100)),
            payment_window: Duration::from_secs(30 * 60),
        }
    }
}

/// Input of an order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub address: String,
    pub name: String,
    pub mobile: String,
    #[serde(default)]
    pub post: String,
}

impl CreateOrderRequest {
    fn validate(&self) -> Result<()> {
        if !self.user_id.is_valid() {
            return Err(SagaError::InvalidRequest(format!(
                "invalid user id {}",
                self.user_id
            )));
        }
        for (field, value) in [
            ("address", &self.address),
            ("name", &self.name),
            ("mobile", &self.mobile),
        ] {
            if value.trim().is_empty() {
                return Err(SagaError::InvalidRequest(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Cart rows priced against the catalog.
#[derive(Debug)]
struct PricedCart {
    lines: Vec<NewOrderGoods>,
    reservation: Vec<StockLine>,
    total: Money,
}

/// Creates orders from shopping carts.
pub struct OrderSaga<L, O, I, C, U> {
    locks: L,
    store: O,
    inventory: I,
    catalog: C,
    users: U,
    config: OrderSagaConfig,
}

impl<L, O, I, C, U> OrderSaga<L, O, I, C, U>
where
    L: LockStore + Clone,
    O: OrderStore,
    I: InventoryClient,
    C: CatalogService,
    U: UserDirectory,
{
    /// Creates a saga with default configuration.
    pub fn new(locks: L, store: O, inventory: I, catalog: C, users: U) -> Self {
        Self::with_config(locks, store, inventory, catalog, users, OrderSagaConfig::default())
    }

    /// Creates a saga with explicit configuration.
    pub fn with_config(
        locks: L,
        store: O,
        inventory: I,
        catalog: C,
        users: U,
        config: OrderSagaConfig,
    ) -> Self {
        Self {
            locks,
            store,
            inventory,
            catalog,
            users,
            config,
        }
    }

    /// Returns the saga configuration.
    pub fn config(&self) -> &OrderSagaConfig {
        &self.config
    }

    /// Turns the user's checked cart rows into an order.
    ///
    /// A second call for the same user while one is in flight fails with
    /// [`SagaError::Busy`].
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderDetail> {
        metrics::counter!("order_create_total").increment(1);
        let started = Instant::now();

        request.validate()?;
        if !self.users.user_exists(request.user_id).await? {
            return Err(SagaError::UserNotFound(request.user_id));
        }

        let lock = DistributedLock::new(
            self.locks.clone(),
            keys::order_create(request.user_id),
            self.config.lock_ttl,
        );
        if !lock.try_acquire(self.config.lock_retry).await? {
            return Err(SagaError::Busy {
                key: lock.key().to_string(),
            });
        }

        let result = self.create_locked(&request).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(key = lock.key(), error = %e, "failed to release order lock");
        }

        let elapsed = started.elapsed();
        if elapsed > self.config.lock_ttl / 2 {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                lock_ttl_ms = self.config.lock_ttl.as_millis() as u64,
                "order creation ran past half the lock TTL"
            );
        }

        let outcome = match &result {
            Ok(_) => "created",
            Err(e) if e.is_retryable() => "busy",
            Err(_) => "failed",
        };
        metrics::histogram!("order_create_duration_seconds", "outcome" => outcome)
            .record(elapsed.as_secs_f64());

        match &result {
            Ok(detail) => tracing::info!(
                order_sn = %detail.order.order_sn,
                order_mount = detail.order.order_mount.cents(),
                "order created"
            ),
            Err(e) => tracing::warn!(error = %e, "order creation failed"),
        }
        result
    }

    async fn create_locked(&self, request: &CreateOrderRequest) -> Result<OrderDetail> {
        let now = Utc::now();
        let window = TimeDelta::from_std(self.config.payment_window)
            .map_err(|_| SagaError::InvalidRequest("payment window out of range".to_string()))?;

        let mut tx = self.store.begin().await?;
        // Rows stay locked until commit, so a concurrent add cannot merge
        // into a row this order is about to consume.
        let cart = tx.checked_cart_for_update(request.user_id).await?;
        if cart.is_empty() {
            return Err(SagaError::EmptyCart(request.user_id));
        }

        let draft = tx
            .insert_order(NewOrder {
                user_id: request.user_id,
                order_sn: generate_order_sn(request.user_id, now),
                status: OrderStatus::WaitBuyerPay,
                order_mount: Money::zero(),
                pay_deadline: now + window,
                address: request.address.clone(),
                signer_name: request.name.clone(),
                signer_mobile: request.mobile.clone(),
                post: request.post.clone(),
                created_at: now,
            })
            .await?;

        let goods_ids: BTreeSet<GoodsId> = cart.iter().map(|c| c.goods_id).collect();
        let goods_ids: Vec<GoodsId> = goods_ids.into_iter().collect();
        let catalog: HashMap<GoodsId, GoodsInfo> = self
            .catalog
            .batch_get_goods(&goods_ids)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect();

        let priced = price_cart(&cart, &catalog)?;

        // Past this point stock is reserved and must be returned on failure.
        self.inventory.sell(&priced.reservation).await?;

        let cart_ids: Vec<i64> = cart.iter().map(|c| c.id).collect();
        match finish_order(tx, draft.clone(), &priced, &cart_ids).await {
            Ok(detail) => Ok(detail),
            Err(e) => {
                self.compensate(&draft.order_sn, &priced.reservation, &e)
                    .await;
                Err(e)
            }
        }
    }

    /// Returns reserved stock after a failure. Never fails; a reback that
    /// cannot be done is recorded for reconciliation.
    async fn compensate(&self, order_sn: &str, reservation: &[StockLine], cause: &SagaError) {
        metrics::counter!("order_create_compensations_total").increment(1);
        tracing::warn!(order_sn, error = %cause, "returning reserved stock");

        let reback_err = match self.inventory.reback(reservation).await {
            Ok(()) => {
                tracing::info!(order_sn, "reserved stock returned");
                return;
            }
            Err(e) => e,
        };

        tracing::error!(
            order_sn,
            error = %reback_err,
            "reback failed, recording for reconciliation"
        );
        let record = NewReconciliation {
            order_sn: Some(order_sn.to_string()),
            reason: format!("reback after failed order creation ({cause}): {reback_err}"),
            lines: reconciliation_lines(reservation),
        };
        if let Err(e) = self.store.record_reconciliation(record).await {
            tracing::error!(
                order_sn,
                error = %e,
                lines = ?reservation,
                "failed to record stock reconciliation"
            );
        }
    }
}

/// Validates every cart row against the catalog and builds the order lines.
fn price_cart(
    cart: &[ShoppingCartItem],
    catalog: &HashMap<GoodsId, GoodsInfo>,
) -> Result<PricedCart> {
    let mut lines = Vec::with_capacity(cart.len());
    let mut reservation = Vec::with_capacity(cart.len());
    let mut total = Money::zero();

    for row in cart {
        let goods = catalog
            .get(&row.goods_id)
            .ok_or(SagaError::GoodsNotFound(row.goods_id))?;
        if !goods.on_sale {
            return Err(SagaError::GoodsOffSale(goods.id));
        }
        if goods.stocks < row.nums {
            return Err(SagaError::InsufficientStock {
                goods_id: goods.id,
                available: goods.stocks,
                requested: row.nums,
            });
        }

        let line = NewOrderGoods {
            goods_id: goods.id,
            goods_name: goods.name.clone(),
            goods_image: goods.goods_front_image.clone(),
            goods_price: goods.shop_price,
            nums: row.nums,
        };
        total = line
            .line_total()
            .and_then(|t| total.checked_add(t))
            .ok_or_else(|| SagaError::InvalidRequest("order total overflows".to_string()))?;

        reservation.push(StockLine::new(goods.id, row.nums));
        lines.push(line);
    }

    Ok(PricedCart {
        lines,
        reservation,
        total,
    })
}

/// Writes the line items and total, deletes the consumed cart rows and
/// commits. Takes the
/// transaction by value so it is gone (rolled back) by the time an error
/// reaches the caller.
async fn finish_order(
    mut tx: Box<dyn OrderTransaction>,
    draft: OrderInfo,
    priced: &PricedCart,
    cart_ids: &[i64],
) -> Result<OrderDetail> {
    let lines = tx.insert_order_goods(draft.id, &priced.lines).await?;
    tx.set_order_mount(draft.id, priced.total).await?;
    let cleared = tx.delete_cart_items(cart_ids).await?;
    tx.commit().await?;

    tracing::debug!(order_sn = %draft.order_sn, cleared, "cart rows consumed");
    Ok(OrderDetail {
        order: OrderInfo {
            order_mount: priced.total,
            ..draft
        },
        lines,
    })
}
