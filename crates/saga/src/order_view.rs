use domain::{OrderGoods, OrderInfo};
use serde::{Deserialize, Serialize};

/// An order header together with its line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: OrderInfo,
    pub lines: Vec<OrderGoods>,
}
