//! In-memory order store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::order::{
    CartItemUpdate, Money, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter, OrderGoods,
    OrderInfo, OrderKey, OrderPage, OrderStatus, ReconciliationRecord, ShoppingCartItem,
};
use crate::store::{OrderStore, OrderTransaction};
use crate::{DomainError, Result};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: BTreeMap<OrderId, OrderInfo>,
    goods: BTreeMap<i64, OrderGoods>,
    cart: BTreeMap<i64, ShoppingCartItem>,
    reconciliations: Vec<ReconciliationRecord>,
    last_order_id: i64,
    last_goods_id: i64,
    last_cart_id: i64,
    last_reconciliation_id: i64,
}

impl Tables {
    fn find(&self, key: &OrderKey) -> Option<&OrderInfo> {
        match key {
            OrderKey::Id(id) => self.orders.get(id),
            OrderKey::Sn(sn) => self.orders.values().find(|o| o.order_sn == *sn),
        }
    }

    fn goods_of(&self, order_id: OrderId) -> Vec<OrderGoods> {
        self.goods
            .values()
            .filter(|g| g.order_id == order_id)
            .cloned()
            .collect()
    }
}

/// In-memory order store for testing and for running without a database.
///
/// A transaction holds the store's single mutex from `begin` until it is
/// committed or dropped, so transactions are fully serialized. Writes are
/// made on a private copy of the tables and swapped in on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
    fail_on_reconciliation: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent commit fail (and roll back).
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent reconciliation write fail.
    pub fn set_fail_on_reconciliation(&self, fail: bool) {
        self.fail_on_reconciliation.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        }))
    }

    async fn find_order(&self, key: &OrderKey) -> Result<Option<OrderInfo>> {
        Ok(self.tables.lock().await.find(key).cloned())
    }

    async fn order_goods(&self, order_id: OrderId) -> Result<Vec<OrderGoods>> {
        Ok(self.tables.lock().await.goods_of(order_id))
    }

    async fn user_orders(&self, user_id: UserId, filter: &OrderFilter) -> Result<OrderPage> {
        let tables = self.tables.lock().await;
        let matching: Vec<&OrderInfo> = tables
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id && filter.matches(o))
            .collect();
        let skip = usize::try_from(filter.offset()).unwrap_or(usize::MAX);

        Ok(OrderPage {
            total: matching.len() as u64,
            orders: matching
                .into_iter()
                .skip(skip)
                .take(filter.page_size as usize)
                .cloned()
                .collect(),
        })
    }

    async fn cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn checked_cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart
            .values()
            .filter(|c| c.user_id == user_id && c.checked)
            .cloned()
            .collect())
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        nums: i32,
        checked: bool,
    ) -> Result<ShoppingCartItem> {
        let mut tables = self.tables.lock().await;

        if let Some(row) = tables
            .cart
            .values_mut()
            .find(|c| c.user_id == user_id && c.goods_id == goods_id)
        {
            row.nums = row.nums.saturating_add(nums);
            row.checked = checked;
            return Ok(row.clone());
        }

        tables.last_cart_id += 1;
        let row = ShoppingCartItem {
            id: tables.last_cart_id,
            user_id,
            goods_id,
            nums,
            checked,
        };
        tables.cart.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_cart_item(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        update: CartItemUpdate,
    ) -> Result<Option<ShoppingCartItem>> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .cart
            .values_mut()
            .find(|c| c.user_id == user_id && c.goods_id == goods_id)
        else {
            return Ok(None);
        };

        if let Some(nums) = update.nums {
            row.nums = nums;
        }
        if let Some(checked) = update.checked {
            row.checked = checked;
        }
        Ok(Some(row.clone()))
    }

    async fn delete_cart_item(&self, user_id: UserId, goods_id: GoodsId) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.cart.len();
        tables
            .cart
            .retain(|_, c| !(c.user_id == user_id && c.goods_id == goods_id));
        Ok(tables.cart.len() < before)
    }

    async fn expired_paying_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderInfo>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Paying && o.pay_deadline < now)
            .cloned()
            .collect())
    }

    async fn record_reconciliation(
        &self,
        record: NewReconciliation,
    ) -> Result<ReconciliationRecord> {
        if self.fail_on_reconciliation.load(Ordering::SeqCst) {
            return Err(DomainError::CommitFailed(
                "reconciliation store unavailable".to_string(),
            ));
        }

        let mut tables = self.tables.lock().await;
        tables.last_reconciliation_id += 1;
        let stored = ReconciliationRecord {
            id: tables.last_reconciliation_id,
            order_sn: record.order_sn,
            reason: record.reason,
            lines: record.lines,
            created_at: Utc::now(),
        };
        tables.reconciliations.push(stored.clone());
        Ok(stored)
    }

    async fn reconciliations(&self) -> Result<Vec<ReconciliationRecord>> {
        Ok(self.tables.lock().await.reconciliations.clone())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_on_commit: bool,
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderInfo> {
        let t = &mut self.working;
        if t.orders.values().any(|o| o.order_sn == order.order_sn) {
            return Err(DomainError::DuplicateOrderSn(order.order_sn));
        }

        t.last_order_id += 1;
        let info = OrderInfo {
            id: OrderId::new(t.last_order_id),
            user_id: order.user_id,
            order_sn: order.order_sn,
            status: order.status,
            pay_type: None,
            order_mount: order.order_mount,
            pay_deadline: order.pay_deadline,
            pay_time: None,
            address: order.address,
            signer_name: order.signer_name,
            signer_mobile: order.signer_mobile,
            post: order.post,
            created_at: order.created_at,
        };
        t.orders.insert(info.id, info.clone());
        Ok(info)
    }

    async fn insert_order_goods(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderGoods],
    ) -> Result<Vec<OrderGoods>> {
        let t = &mut self.working;
        if !t.orders.contains_key(&order_id) {
            return Err(DomainError::OrderNotFound(OrderKey::Id(order_id)));
        }

        let mut inserted = Vec::with_capacity(lines.len());
        for line in lines {
            t.last_goods_id += 1;
            let row = OrderGoods {
                id: t.last_goods_id,
                order_id,
                goods_id: line.goods_id,
                goods_name: line.goods_name.clone(),
                goods_image: line.goods_image.clone(),
                goods_price: line.goods_price,
                nums: line.nums,
            };
            t.goods.insert(row.id, row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn set_order_mount(&mut self, order_id: OrderId, order_mount: Money) -> Result<()> {
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or(DomainError::OrderNotFound(OrderKey::Id(order_id)))?;
        order.order_mount = order_mount;
        Ok(())
    }

    async fn checked_cart_for_update(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<ShoppingCartItem>> {
        Ok(self
            .working
            .cart
            .values()
            .filter(|c| c.user_id == user_id && c.checked)
            .cloned()
            .collect())
    }

    async fn delete_cart_items(&mut self, ids: &[i64]) -> Result<u64> {
        let cart = &mut self.working.cart;
        let before = cart.len();
        cart.retain(|id, _| !ids.contains(id));
        Ok((before - cart.len()) as u64)
    }

    async fn find_order_for_update(&mut self, key: &OrderKey) -> Result<Option<OrderInfo>> {
        Ok(self.working.find(key).cloned())
    }

    async fn order_goods(&mut self, order_id: OrderId) -> Result<Vec<OrderGoods>> {
        Ok(self.working.goods_of(order_id))
    }

    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        pay_time: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                if pay_time.is_some() {
                    order.pay_time = pay_time;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_order(&mut self, order_id: OrderId) -> Result<bool> {
        let t = &mut self.working;
        t.goods.retain(|_, g| g.order_id != order_id);
        Ok(t.orders.remove(&order_id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_on_commit {
            return Err(DomainError::CommitFailed("injected commit failure".to_string()));
        }
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(user: i32, sn: &str) -> NewOrder {
        let now = Utc::now();
        NewOrder {
            user_id: UserId::new(user),
            order_sn: sn.to_string(),
            status: OrderStatus::WaitBuyerPay,
            order_mount: Money::zero(),
            pay_deadline: now + Duration::minutes(30),
            address: "1 Main St".to_string(),
            signer_name: "Ada".to_string(),
            signer_mobile: "13800000000".to_string(),
            post: String::new(),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemoryOrderStore::new();

        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(draft(1, "sn-1")).await.unwrap();
        tx.set_order_mount(order.id, Money::from_cents(500)).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_order(&OrderKey::Sn("sn-1".into())).await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(found.order_mount.cents(), 500);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryOrderStore::new();
        store.add_to_cart(UserId::new(1), GoodsId::new(7), 2, true).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(draft(1, "sn-1")).await.unwrap();
            let rows = tx.checked_cart_for_update(UserId::new(1)).await.unwrap();
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            assert_eq!(tx.delete_cart_items(&ids).await.unwrap(), 1);
        }

        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.checked_cart(UserId::new(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_commit_rolls_back() {
        let store = InMemoryOrderStore::new();
        store.set_fail_on_commit(true);

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(draft(1, "sn-1")).await.unwrap();
        assert!(matches!(tx.commit().await, Err(DomainError::CommitFailed(_))));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_order_sn_is_rejected() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(draft(1, "sn-1")).await.unwrap();
        let err = tx.insert_order(draft(2, "sn-1")).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateOrderSn(_)));
    }

    #[tokio::test]
    async fn transition_is_conditional_on_current_status() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(draft(1, "sn-1")).await.unwrap();

        assert!(!tx
            .transition_status(order.id, OrderStatus::Paying, OrderStatus::TradeClosed, None)
            .await
            .unwrap());
        assert!(tx
            .transition_status(order.id, OrderStatus::WaitBuyerPay, OrderStatus::Paying, None)
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let found = store.find_order(&OrderKey::Id(order.id)).await.unwrap().unwrap();
        assert_eq!(found.status, OrderStatus::Paying);
    }

    #[tokio::test]
    async fn add_to_cart_merges_rows() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new(3);
        store.add_to_cart(user, GoodsId::new(1), 2, true).await.unwrap();
        let merged = store.add_to_cart(user, GoodsId::new(1), 3, true).await.unwrap();
        assert_eq!(merged.nums, 5);
        assert_eq!(store.cart(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cart_rows_can_be_updated_and_removed() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new(3);
        store.add_to_cart(user, GoodsId::new(1), 2, true).await.unwrap();

        let row = store
            .update_cart_item(
                user,
                GoodsId::new(1),
                CartItemUpdate {
                    nums: None,
                    checked: Some(false),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.nums, row.checked), (2, false));
        assert!(store.checked_cart(user).await.unwrap().is_empty());

        let row = store
            .update_cart_item(
                user,
                GoodsId::new(1),
                CartItemUpdate {
                    nums: Some(7),
                    checked: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!((row.nums, row.checked), (7, false));

        let missing = store
            .update_cart_item(UserId::new(4), GoodsId::new(1), CartItemUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());

        assert!(!store.delete_cart_item(UserId::new(4), GoodsId::new(1)).await.unwrap());
        assert!(store.delete_cart_item(user, GoodsId::new(1)).await.unwrap());
        assert!(store.cart(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cart_items_leaves_other_rows() {
        let store = InMemoryOrderStore::new();
        let user = UserId::new(1);
        let first = store.add_to_cart(user, GoodsId::new(1), 1, true).await.unwrap();
        store.add_to_cart(user, GoodsId::new(2), 1, true).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.checked_cart_for_update(user).await.unwrap().len(), 2);
        assert_eq!(tx.delete_cart_items(&[first.id]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let left = store.cart(user).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].goods_id, GoodsId::new(2));
    }

    #[tokio::test]
    async fn user_orders_are_paged_and_filtered() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        for i in 0..5 {
            tx.insert_order(draft(1, &format!("sn-{i}"))).await.unwrap();
        }
        tx.insert_order(draft(2, "other")).await.unwrap();
        let paying = tx.insert_order(draft(1, "sn-paying")).await.unwrap();
        tx.transition_status(paying.id, OrderStatus::WaitBuyerPay, OrderStatus::Paying, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let page = store
            .user_orders(UserId::new(1), &OrderFilter::new(None, Some(1), Some(4)))
            .await
            .unwrap();
        assert_eq!(page.total, 6);
        assert_eq!(page.orders.len(), 4);
        assert_eq!(page.orders[0].order_sn, "sn-paying");

        let page = store
            .user_orders(UserId::new(1), &OrderFilter::new(None, Some(2), Some(4)))
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[1].order_sn, "sn-0");

        let page = store
            .user_orders(
                UserId::new(1),
                &OrderFilter::new(Some(OrderStatus::Paying), None, None),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.orders[0].id, paying.id);
    }

    #[tokio::test]
    async fn delete_order_removes_its_lines() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx.insert_order(draft(1, "sn-1")).await.unwrap();
        tx.insert_order_goods(
            order.id,
            &[NewOrderGoods {
                goods_id: GoodsId::new(9),
                goods_name: "tea".into(),
                goods_image: String::new(),
                goods_price: Money::from_cents(100),
                nums: 1,
            }],
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_order(order.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(store.order_goods(order.id).await.unwrap().is_empty());
        assert!(store.find_order(&OrderKey::Id(order.id)).await.unwrap().is_none());
    }
}
