//! Order status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// WAIT_BUYER_PAY ──► PAYING ──► TRADE_SUCCESS ──► TRADE_FINISHED
///       │               │
///       └───────────────┴──► TRADE_CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, stock reserved, buyer has not started paying.
    #[default]
    WaitBuyerPay,

    /// Payment started; the payment deadline is being watched.
    Paying,

    /// Paid.
    TradeSuccess,

    /// Cancelled or expired; reserved stock has been returned (terminal).
    TradeClosed,

    /// Paid and fulfilled (terminal).
    TradeFinished,
}

impl OrderStatus {
    /// Returns true if an order may move from `self` to `next`.
    ///
    /// Staying in the same status is not a transition; callers treat it as
    /// a no-op before consulting this table.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (WaitBuyerPay, Paying)
                | (WaitBuyerPay, TradeClosed)
                | (Paying, TradeSuccess)
                | (Paying, TradeClosed)
                | (TradeSuccess, TradeFinished)
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::TradeClosed | OrderStatus::TradeFinished)
    }

    /// Returns true if an order in this status may be deleted.
    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            OrderStatus::WaitBuyerPay | OrderStatus::Paying | OrderStatus::TradeClosed
        )
    }

    /// Returns true while the order's stock is still reserved and has not
    /// been returned to inventory.
    pub fn holds_stock(&self) -> bool {
        matches!(self, OrderStatus::WaitBuyerPay | OrderStatus::Paying)
    }

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::WaitBuyerPay => "WAIT_BUYER_PAY",
            OrderStatus::Paying => "PAYING",
            OrderStatus::TradeSuccess => "TRADE_SUCCESS",
            OrderStatus::TradeClosed => "TRADE_CLOSED",
            OrderStatus::TradeFinished => "TRADE_FINISHED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAIT_BUYER_PAY" => Ok(OrderStatus::WaitBuyerPay),
            "PAYING" => Ok(OrderStatus::Paying),
            "TRADE_SUCCESS" => Ok(OrderStatus::TradeSuccess),
            "TRADE_CLOSED" => Ok(OrderStatus::TradeClosed),
            "TRADE_FINISHED" => Ok(OrderStatus::TradeFinished),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
