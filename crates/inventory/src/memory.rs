use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::GoodsId;
use tokio::sync::RwLock;

use crate::{InventoryError, Result, StockLedger, StockRecord, StockUpdate};

/// In-memory stock ledger for testing.
///
/// Provides the same all-or-nothing CAS semantics as the PostgreSQL ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockLedger {
    rows: Arc<RwLock<HashMap<GoodsId, StockRecord>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-seeded with `(goods_id, stock)` rows at version 0.
    pub fn with_stock(rows: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(id, stock)| {
                let goods_id = GoodsId::new(id);
                (
                    goods_id,
                    StockRecord {
                        goods_id,
                        stock,
                        version: 0,
                    },
                )
            })
            .collect();
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    /// Bumps a row's version without touching its stock, simulating a writer
    /// that bypassed the inventory locks.
    pub async fn bump_version(&self, goods_id: GoodsId) {
        if let Some(row) = self.rows.write().await.get_mut(&goods_id) {
            row.version += 1;
        }
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn get(&self, goods_id: GoodsId) -> Result<Option<StockRecord>> {
        Ok(self.rows.read().await.get(&goods_id).copied())
    }

    async fn get_many(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockRecord>> {
        let rows = self.rows.read().await;
        Ok(goods_ids.iter().filter_map(|id| rows.get(id).copied()).collect())
    }

    async fn upsert(&self, goods_id: GoodsId, stock: i32) -> Result<StockRecord> {
        let mut rows = self.rows.write().await;
        let record = rows
            .entry(goods_id)
            .and_modify(|r| {
                r.stock = stock;
                r.version += 1;
            })
            .or_insert(StockRecord {
                goods_id,
                stock,
                version: 0,
            });
        Ok(*record)
    }

    async fn apply(&self, updates: &[StockUpdate]) -> Result<()> {
        let mut rows = self.rows.write().await;

        // Check every condition before writing anything.
        for update in updates {
            match rows.get(&update.goods_id) {
                Some(row) if row.version == update.expected_version => {}
                _ => {
                    return Err(InventoryError::VersionConflict {
                        goods_id: update.goods_id,
                        expected_version: update.expected_version,
                    });
                }
            }
            if update.new_stock < 0 {
                return Err(InventoryError::InvalidRequest(format!(
                    "stock of goods {} would become negative",
                    update.goods_id
                )));
            }
        }

        for update in updates {
            if let Some(row) = rows.get_mut(&update.goods_id) {
                row.stock = update.new_stock;
                row.version += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_creates_then_bumps_version() {
        let ledger = InMemoryStockLedger::new();
        let id = GoodsId::new(42);

        let created = ledger.upsert(id, 10).await.unwrap();
        assert_eq!((created.stock, created.version), (10, 0));

        let updated = ledger.upsert(id, 7).await.unwrap();
        assert_eq!((updated.stock, updated.version), (7, 1));
    }

    #[tokio::test]
    async fn apply_is_all_or_nothing() {
        let ledger = InMemoryStockLedger::with_stock([(1, 10), (2, 10)]);

        let result = ledger
            .apply(&[
                StockUpdate {
                    goods_id: GoodsId::new(1),
                    expected_version: 0,
                    new_stock: 5,
                },
                StockUpdate {
                    goods_id: GoodsId::new(2),
                    expected_version: 3,
                    new_stock: 5,
                },
            ])
            .await;

        assert!(matches!(
            result,
            Err(InventoryError::VersionConflict {
                goods_id,
                expected_version: 3
            }) if goods_id == GoodsId::new(2)
        ));
        let row = ledger.get(GoodsId::new(1)).await.unwrap().unwrap();
        assert_eq!((row.stock, row.version), (10, 0));
    }

    #[tokio::test]
    async fn get_many_skips_missing_rows() {
        let ledger = InMemoryStockLedger::with_stock([(1, 3)]);
        let rows = ledger
            .get_many(&[GoodsId::new(1), GoodsId::new(99)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].goods_id, GoodsId::new(1));
    }
}
