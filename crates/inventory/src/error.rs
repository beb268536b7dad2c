use common::GoodsId;
use locks::LockError;
use thiserror::Error;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The request was malformed (empty batch, non-positive quantity, ...).
    #[error("Invalid inventory request: {0}")]
    InvalidRequest(String),

    /// A good in the request has no stock row.
    #[error("No inventory record for goods {0}")]
    NotFound(GoodsId),

    /// A line asked for more than is in stock. No line of the batch was applied.
    #[error("Insufficient stock for goods {goods_id}: available {available}, requested {requested}")]
    InsufficientStock {
        goods_id: GoodsId,
        available: i32,
        requested: i32,
    },

    /// A conditional update found a different version than the one read.
    #[error("Version conflict for goods {goods_id}: expected version {expected_version}")]
    VersionConflict {
        goods_id: GoodsId,
        expected_version: i64,
    },

    /// Version conflicts persisted after every internal retry.
    #[error("Concurrent stock update for goods {goods_id}, retry later")]
    Aborted { goods_id: GoodsId },

    /// The inventory locks could not be taken in time.
    #[error("Inventory is busy, retry later: {0}")]
    Busy(#[source] LockError),

    /// The lock store failed.
    #[error("Lock error: {0}")]
    Lock(#[source] LockError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<LockError> for InventoryError {
    fn from(e: LockError) -> Self {
        if e.is_busy() {
            InventoryError::Busy(e)
        } else {
            InventoryError::Lock(e)
        }
    }
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
