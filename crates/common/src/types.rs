use serde::{Deserialize, Serialize};

/// Identifier of a catalog good.
///
/// Goods ids are assigned by the catalog service. They are also the sort key
/// used when several inventory locks have to be taken at once, so the type
/// derives `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodsId(i32);

impl GoodsId {
    /// Creates a goods id from its raw value.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for GoodsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for GoodsId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Identifier of a buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    /// Creates a user id from its raw value.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub fn get(&self) -> i32 {
        self.0
    }

    /// Returns true for ids the user service could ever have issued.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

/// Database identifier of an order.
///
/// Orders also carry a human-facing `order_sn`; this is the surrogate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Creates an order id from its raw value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
