use common::GoodsId;
use serde::{Deserialize, Serialize};

/// Stock counter of one good together with its CAS version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub goods_id: GoodsId,
    pub stock: i32,
    pub version: i64,
}

/// One line of a sell or reback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub goods_id: GoodsId,
    pub num: i32,
}

impl StockLine {
    pub fn new(goods_id: impl Into<GoodsId>, num: i32) -> Self {
        Self {
            goods_id: goods_id.into(),
            num,
        }
    }
}

/// A conditional write: set `stock` to `new_stock` only if the row is still
/// at `expected_version`. Applying it bumps the version by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockUpdate {
    pub goods_id: GoodsId,
    pub expected_version: i64,
    pub new_stock: i32,
}
