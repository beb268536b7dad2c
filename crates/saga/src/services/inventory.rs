//! Inventory client trait, its implementation over the local inventory
//! service, and a fault-injecting wrapper for testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use domain::OrderGoods;
use inventory::{InventoryError, InventoryService, StockLedger, StockLine};
use locks::{LockError, LockStore};

/// The inventory operations the order flows depend on.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Reserves stock for every line, all or nothing.
    async fn sell(&self, lines: &[StockLine]) -> Result<(), InventoryError>;

    /// Returns previously reserved stock for every line, all or nothing.
    async fn reback(&self, lines: &[StockLine]) -> Result<(), InventoryError>;
}

#[async_trait]
impl<L, S> InventoryClient for InventoryService<L, S>
where
    L: LockStore + Clone + 'static,
    S: StockLedger + 'static,
{
    async fn sell(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        InventoryService::sell(self, lines).await
    }

    async fn reback(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        InventoryService::reback(self, lines).await
    }
}

#[async_trait]
impl<T: InventoryClient + ?Sized> InventoryClient for Arc<T> {
    async fn sell(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        (**self).sell(lines).await
    }

    async fn reback(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        (**self).reback(lines).await
    }
}

/// Converts persisted line items into inventory lines.
pub fn stock_lines(goods: &[OrderGoods]) -> Vec<StockLine> {
    goods
        .iter()
        .map(|g| StockLine::new(g.goods_id, g.nums))
        .collect()
}

fn unavailable() -> InventoryError {
    InventoryError::Lock(LockError::Backend("inventory unavailable".to_string()))
}

/// Wraps an inventory client and fails chosen calls on demand.
#[derive(Debug, Clone, Default)]
pub struct FaultyInventory<I> {
    inner: I,
    fail_on_sell: Arc<AtomicBool>,
    fail_on_reback: Arc<AtomicBool>,
    reback_calls: Arc<AtomicUsize>,
}

impl<I: InventoryClient> FaultyInventory<I> {
    /// Wraps `inner`; no call fails until configured to.
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            fail_on_sell: Arc::default(),
            fail_on_reback: Arc::default(),
            reback_calls: Arc::default(),
        }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Configures the wrapper to fail every sell call.
    pub fn set_fail_on_sell(&self, fail: bool) {
        self.fail_on_sell.store(fail, Ordering::SeqCst);
    }

    /// Configures the wrapper to fail every reback call.
    pub fn set_fail_on_reback(&self, fail: bool) {
        self.fail_on_reback.store(fail, Ordering::SeqCst);
    }

    /// Returns how many reback calls were made, failed ones included.
    pub fn reback_calls(&self) -> usize {
        self.reback_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I: InventoryClient> InventoryClient for FaultyInventory<I> {
    async fn sell(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        if self.fail_on_sell.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.sell(lines).await
    }

    async fn reback(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        self.reback_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_reback.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.reback(lines).await
    }
}
