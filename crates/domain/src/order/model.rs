//! Persisted order records.

use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderStatus};

/// Identifies an order either by database id or by order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    Id(OrderId),
    Sn(String),
}

impl OrderKey {
    /// Returns true if `order` is the order this key names.
    pub fn matches(&self, order: &OrderInfo) -> bool {
        match self {
            OrderKey::Id(id) => order.id == *id,
            OrderKey::Sn(sn) => order.order_sn == *sn,
        }
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKey::Id(id) => write!(f, "id {id}"),
            OrderKey::Sn(sn) => write!(f, "sn {sn}"),
        }
    }
}

impl From<OrderId> for OrderKey {
    fn from(id: OrderId) -> Self {
        OrderKey::Id(id)
    }
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_sn: String,
    pub status: OrderStatus,
    pub pay_type: Option<String>,
    /// Sum of the line totals.
    pub order_mount: Money,
    /// Unpaid orders still `PAYING` after this instant are closed by the reaper.
    pub pay_deadline: DateTime<Utc>,
    pub pay_time: Option<DateTime<Utc>>,
    pub address: String,
    pub signer_name: String,
    pub signer_mobile: String,
    pub post: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of a draft order before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub order_sn: String,
    pub status: OrderStatus,
    pub order_mount: Money,
    pub pay_deadline: DateTime<Utc>,
    pub address: String,
    pub signer_name: String,
    pub signer_mobile: String,
    pub post: String,
    pub created_at: DateTime<Utc>,
}

/// A line item, frozen at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGoods {
    pub id: i64,
    pub order_id: OrderId,
    pub goods_id: GoodsId,
    pub goods_name: String,
    pub goods_image: String,
    pub goods_price: Money,
    pub nums: i32,
}

/// A line item before insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderGoods {
    pub goods_id: GoodsId,
    pub goods_name: String,
    pub goods_image: String,
    pub goods_price: Money,
    pub nums: i32,
}

impl NewOrderGoods {
    /// Price times quantity, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.goods_price.checked_mul(self.nums)
    }
}

/// A cart row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingCartItem {
    pub id: i64,
    pub user_id: UserId,
    pub goods_id: GoodsId,
    pub nums: i32,
    /// Only checked rows are turned into an order.
    pub checked: bool,
}

/// Changes to a cart row. `None` leaves the field as it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemUpdate {
    pub nums: Option<i32>,
    pub checked: Option<bool>,
}

/// Paging and status filter for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl OrderFilter {
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Builds a filter, replacing a missing or zero page with 1, a missing
    /// or zero page size with 10, and capping the page size at 100.
    pub fn new(status: Option<OrderStatus>, page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(Self::DEFAULT_PAGE_SIZE)
            .min(Self::MAX_PAGE_SIZE);
        Self {
            status,
            page,
            page_size,
        }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn matches(&self, order: &OrderInfo) -> bool {
        self.status.is_none_or(|s| order.status == s)
    }
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// One page of a user's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    /// Orders matching the filter across all pages.
    pub total: u64,
    pub orders: Vec<OrderInfo>,
}

/// One goods quantity a failed compensation could not return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationLine {
    pub goods_id: GoodsId,
    pub num: i32,
}

/// Stock an operator has to restore by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: i64,
    pub order_sn: Option<String>,
    pub reason: String,
    pub lines: Vec<ReconciliationLine>,
    pub created_at: DateTime<Utc>,
}

/// A reconciliation record before insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReconciliation {
    pub order_sn: Option<String>,
    pub reason: String,
    pub lines: Vec<ReconciliationLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_filter_defaults_and_caps() {
        let filter = OrderFilter::new(None, Some(0), None);
        assert_eq!((filter.page, filter.page_size), (1, 10));
        assert_eq!(filter.offset(), 0);

        let filter = OrderFilter::new(None, Some(3), Some(500));
        assert_eq!(filter.page_size, 100);
        assert_eq!(filter.offset(), 200);

        assert_eq!(OrderFilter::new(None, None, Some(0)).page_size, 10);
    }
}
