//! Set/Get/Sell/Reback over a stock ledger.

use std::collections::BTreeMap;
use std::time::Duration;

use common::GoodsId;
use locks::{BatchLockManager, LockStore, RetryPolicy};

use crate::{InventoryError, Result, StockLedger, StockLine, StockRecord, StockUpdate};

/// Tuning knobs for [`InventoryService`].
#[derive(Debug, Clone, Copy)]
pub struct InventoryConfig {
    /// TTL of each `inventory:lock:<goods_id>` lock.
    pub lock_ttl: Duration,
    /// Retry budget for taking each lock of a batch.
    pub lock_retry: RetryPolicy,
    /// How many times a version conflict is re-read and retried while the
    /// batch locks are still held.
    pub conflict_retries: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(15),
            lock_retry: RetryPolicy::new(3, Duration::from_millis(100)),
            conflict_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Sell,
    Reback,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Sell => "sell",
            Direction::Reback => "reback",
        }
    }
}

/// Inventory operations guarded by ordered batch locks and version CAS.
///
/// Calls touching disjoint goods never contend; calls touching overlapping
/// goods serialize on the shared locks in ascending goods-id order.
#[derive(Clone)]
pub struct InventoryService<L, S> {
    locks: L,
    ledger: S,
    config: InventoryConfig,
}

impl<L, S> InventoryService<L, S>
where
    L: LockStore + Clone,
    S: StockLedger,
{
    /// Creates an inventory service with default configuration.
    pub fn new(locks: L, ledger: S) -> Self {
        Self::with_config(locks, ledger, InventoryConfig::default())
    }

    /// Creates an inventory service with explicit configuration.
    pub fn with_config(locks: L, ledger: S, config: InventoryConfig) -> Self {
        Self {
            locks,
            ledger,
            config,
        }
    }

    /// Returns the underlying ledger.
    pub fn ledger(&self) -> &S {
        &self.ledger
    }

    /// Sets the stock of a good, creating its record if needed.
    #[tracing::instrument(skip(self), fields(goods_id = %goods_id))]
    pub async fn set_inventory(&self, goods_id: GoodsId, num: i32) -> Result<StockRecord> {
        if num < 0 {
            return Err(InventoryError::InvalidRequest(format!(
                "stock of goods {goods_id} cannot be negative"
            )));
        }

        let mut batch =
            BatchLockManager::for_goods(self.locks.clone(), [goods_id], self.config.lock_ttl);
        batch.lock_all(self.config.lock_retry).await?;
        let result = self.ledger.upsert(goods_id, num).await;
        batch.unlock_all().await;

        let record = result?;
        tracing::info!(stock = record.stock, version = record.version, "inventory set");
        Ok(record)
    }

    /// Returns the stock of a good; an absent record counts as zero.
    pub async fn get_inventory(&self, goods_id: GoodsId) -> Result<i32> {
        Ok(self
            .ledger
            .get(goods_id)
            .await?
            .map(|r| r.stock)
            .unwrap_or(0))
    }

    /// Returns the full record of a good, if any.
    pub async fn get_record(&self, goods_id: GoodsId) -> Result<Option<StockRecord>> {
        self.ledger.get(goods_id).await
    }

    /// Decrements stock for every line, all or nothing.
    ///
    /// Fails with `NotFound` if a good has no record, `InsufficientStock` if
    /// any line is short, `Aborted` if version conflicts outlast the retry
    /// budget and `Busy` if the locks could not be taken.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn sell(&self, lines: &[StockLine]) -> Result<()> {
        self.mutate(lines, Direction::Sell).await
    }

    /// Returns previously sold stock for every line, all or nothing.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn reback(&self, lines: &[StockLine]) -> Result<()> {
        self.mutate(lines, Direction::Reback).await
    }

    async fn mutate(&self, lines: &[StockLine], direction: Direction) -> Result<()> {
        let wanted = merge_lines(lines)?;
        let goods_ids: Vec<GoodsId> = wanted.keys().copied().collect();

        let mut batch = BatchLockManager::for_goods(
            self.locks.clone(),
            goods_ids.iter().copied(),
            self.config.lock_ttl,
        );
        batch.lock_all(self.config.lock_retry).await?;

        let result = self.apply_locked(&goods_ids, &wanted, direction).await;
        batch.unlock_all().await;

        match &result {
            Ok(()) => {
                match direction {
                    Direction::Sell => metrics::counter!("inventory_sell_total").increment(1),
                    Direction::Reback => metrics::counter!("inventory_reback_total").increment(1),
                }
                tracing::info!(
                    op = direction.as_str(),
                    goods = goods_ids.len(),
                    "inventory updated"
                );
            }
            Err(e) => {
                metrics::counter!("inventory_rejected_total", "op" => direction.as_str())
                    .increment(1);
                tracing::warn!(op = direction.as_str(), error = %e, "inventory update rejected");
            }
        }
        result
    }

    /// Read, validate and CAS-write the batch. Must be called with every lock
    /// of `goods_ids` held.
    async fn apply_locked(
        &self,
        goods_ids: &[GoodsId],
        wanted: &BTreeMap<GoodsId, i32>,
        direction: Direction,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            let records: BTreeMap<GoodsId, StockRecord> = self
                .ledger
                .get_many(goods_ids)
                .await?
                .into_iter()
                .map(|r| (r.goods_id, r))
                .collect();

            let mut updates = Vec::with_capacity(wanted.len());
            for (&goods_id, &num) in wanted {
                let record = records
                    .get(&goods_id)
                    .ok_or(InventoryError::NotFound(goods_id))?;

                let new_stock = match direction {
                    Direction::Sell => {
                        if record.stock < num {
                            return Err(InventoryError::InsufficientStock {
                                goods_id,
                                available: record.stock,
                                requested: num,
                            });
                        }
                        record.stock - num
                    }
                    Direction::Reback => record.stock.checked_add(num).ok_or_else(|| {
                        InventoryError::InvalidRequest(format!(
                            "stock of goods {goods_id} would overflow"
                        ))
                    })?,
                };

                updates.push(StockUpdate {
                    goods_id,
                    expected_version: record.version,
                    new_stock,
                });
            }

            match self.ledger.apply(&updates).await {
                Ok(()) => return Ok(()),
                Err(InventoryError::VersionConflict { goods_id, .. }) => {
                    metrics::counter!("inventory_version_conflicts_total").increment(1);
                    if attempt >= self.config.conflict_retries {
                        tracing::warn!(
                            %goods_id,
                            attempts = attempt + 1,
                            "version conflict persisted"
                        );
                        return Err(InventoryError::Aborted { goods_id });
                    }
                    attempt += 1;
                    tracing::debug!(%goods_id, attempt, "version conflict, re-reading");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Validates request lines and sums duplicate goods.
fn merge_lines(lines: &[StockLine]) -> Result<BTreeMap<GoodsId, i32>> {
    if lines.is_empty() {
        return Err(InventoryError::InvalidRequest("no goods given".to_string()));
    }

    let mut merged = BTreeMap::new();
    for line in lines {
        if line.num <= 0 {
            return Err(InventoryError::InvalidRequest(format!(
                "quantity for goods {} must be positive, got {}",
                line.goods_id, line.num
            )));
        }
        let total: &mut i32 = merged.entry(line.goods_id).or_insert(0);
        *total = total.checked_add(line.num).ok_or_else(|| {
            InventoryError::InvalidRequest(format!(
                "quantity for goods {} overflows",
                line.goods_id
            ))
        })?;
    }
    Ok(merged)
}
