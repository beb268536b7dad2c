use std::sync::Arc;

use async_trait::async_trait;
use common::GoodsId;

use crate::{Result, StockRecord, StockUpdate};

/// Storage for stock records.
///
/// Implementations must apply a batch of [`StockUpdate`]s atomically: if any
/// update's expected version does not match, none of them is applied and
/// [`InventoryError::VersionConflict`](crate::InventoryError::VersionConflict)
/// is returned.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reads one record.
    async fn get(&self, goods_id: GoodsId) -> Result<Option<StockRecord>>;

    /// Reads every record that exists among `goods_ids`. Missing ids are
    /// simply absent from the result.
    async fn get_many(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockRecord>>;

    /// Creates the record at version 0, or overwrites its stock and bumps
    /// the version.
    async fn upsert(&self, goods_id: GoodsId, stock: i32) -> Result<StockRecord>;

    /// Applies every update in one transaction, all or nothing.
    async fn apply(&self, updates: &[StockUpdate]) -> Result<()>;
}

#[async_trait]
impl<T: StockLedger + ?Sized> StockLedger for Arc<T> {
    async fn get(&self, goods_id: GoodsId) -> Result<Option<StockRecord>> {
        (**self).get(goods_id).await
    }

    async fn get_many(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockRecord>> {
        (**self).get_many(goods_ids).await
    }

    async fn upsert(&self, goods_id: GoodsId, stock: i32) -> Result<StockRecord> {
        (**self).upsert(goods_id, stock).await
    }

    async fn apply(&self, updates: &[StockUpdate]) -> Result<()> {
        (**self).apply(updates).await
    }
}
