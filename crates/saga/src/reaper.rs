//! Background closing of unpaid orders past their payment deadline.

use std::time::Duration;

use chrono::Utc;
use domain::{OrderInfo, OrderStatus, OrderStore, OrderTransaction};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::compensation::take_back_returned_stock;
use crate::error::Result;
use crate::services::{InventoryClient, stock_lines};

/// Tuning knobs for [`TimeoutReaper`].
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Time between two scans. The first scan runs immediately.
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Expired `PAYING` orders found.
    pub scanned: usize,
    /// Orders closed and rebacked by this scan.
    pub closed: usize,
    /// Orders that had already left `PAYING` by the time they were flipped.
    pub skipped: usize,
    /// Orders left for the next scan after an error.
    pub failed: usize,
}

/// Closes `PAYING` orders whose payment deadline has passed and returns
/// their stock.
///
/// Every order is closed in its own transaction with a flip conditioned on
/// the order still being `PAYING`, so overlapping scans close and reback an
/// order exactly once. A close whose commit fails reserves the returned
/// stock again, leaving the order as it was for the next scan.
pub struct TimeoutReaper<O, I> {
    store: O,
    inventory: I,
    config: ReaperConfig,
}

impl<O, I> TimeoutReaper<O, I>
where
    O: OrderStore,
    I: InventoryClient,
{
    /// Creates a reaper with default configuration.
    pub fn new(store: O, inventory: I) -> Self {
        Self::with_config(store, inventory, ReaperConfig::default())
    }

    /// Creates a reaper with explicit configuration.
    pub fn with_config(store: O, inventory: I, config: ReaperConfig) -> Self {
        Self {
            store,
            inventory,
            config,
        }
    }

    /// Runs one scan.
    #[tracing::instrument(skip(self))]
    pub async fn reap_once(&self) -> Result<ReapReport> {
        let expired = self.store.expired_paying_orders(Utc::now()).await?;
        let mut report = ReapReport {
            scanned: expired.len(),
            ..ReapReport::default()
        };

        for order in &expired {
            match self.close_order(order).await {
                Ok(true) => report.closed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        order_sn = %order.order_sn,
                        error = %e,
                        "failed to close expired order"
                    );
                }
            }
        }

        metrics::counter!("reaper_closed_total").increment(report.closed as u64);
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                closed = report.closed,
                skipped = report.skipped,
                failed = report.failed,
                "expired orders reaped"
            );
        }
        Ok(report)
    }

    /// Returns false when the order was no longer `PAYING`.
    async fn close_order(&self, order: &OrderInfo) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        if !tx
            .transition_status(order.id, OrderStatus::Paying, OrderStatus::TradeClosed, None)
            .await?
        {
            return Ok(false);
        }

        let lines = stock_lines(&tx.order_goods(order.id).await?);
        if !lines.is_empty() {
            self.inventory.reback(&lines).await?;
        }
        if let Err(e) = tx.commit().await {
            // The order is still PAYING and the next scan returns its stock again.
            if !lines.is_empty() {
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

        tracing::debug!(order_sn = %order.order_sn, "expired order closed");
        Ok(true)
    }

    /// Scans every `interval` until `shutdown` flips to true or its sender
    /// is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.config.interval.as_secs(), "timeout reaper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_once().await {
                        tracing::error!(error = %e, "reaper scan failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("timeout reaper stopped");
    }
}
