//! Undoing stock movements whose order change did not commit.

use domain::{NewReconciliation, OrderStore, ReconciliationLine};
use inventory::StockLine;

use crate::services::InventoryClient;

/// Converts stock lines into reconciliation lines.
pub(crate) fn reconciliation_lines(lines: &[StockLine]) -> Vec<ReconciliationLine> {
    lines
        .iter()
        .map(|l| ReconciliationLine {
            goods_id: l.goods_id,
            num: l.num,
        })
        .collect()
}

/// Reserves `lines` again after they were returned for an order change that
/// then failed to commit.
///
/// The order still holds that stock and will return it again when the
/// change is retried, so leaving the units in the ledger would count them
/// twice. If the stock cannot be taken back, a reconciliation record names
/// the surplus.
pub(crate) async fn take_back_returned_stock<I, O>(
    inventory: &I,
    store: &O,
    order_sn: &str,
    lines: &[StockLine],
    cause: &str,
) where
    I: InventoryClient + ?Sized,
    O: OrderStore + ?Sized,
{
    metrics::counter!("order_stock_take_back_total").increment(1);
    tracing::warn!(order_sn, cause, "order change not committed, reserving returned stock again");

    let sell_err = match inventory.sell(lines).await {
        Ok(()) => {
            tracing::info!(order_sn, "returned stock reserved again");
            return;
        }
        Err(e) => e,
    };

    tracing::error!(order_sn, error = %sell_err, "could not reserve returned stock again");
    let record = NewReconciliation {
        order_sn: Some(order_sn.to_string()),
        reason: format!(
            "stock returned but order change not committed ({cause}); re-reserve failed: {sell_err}"
        ),
        lines: reconciliation_lines(lines),
    };
    if let Err(e) = store.record_reconciliation(record).await {
        tracing::error!(
            order_sn,
            error = %e,
            lines = ?lines,
            "failed to record stock reconciliation"
        );
    }
}
