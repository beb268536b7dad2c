//! Saga error types.

use common::{GoodsId, OrderId, UserId};
use domain::{DomainError, OrderKey, OrderStatus};
use inventory::InventoryError;
use locks::LockError;
use thiserror::Error;

/// Errors that can occur while creating or managing orders.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The user directory does not know the user.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// The user has no checked cart rows.
    #[error("No goods selected in the cart of user {0}")]
    EmptyCart(UserId),

    /// The catalog does not know a good in the cart.
    #[error("Goods not found: {0}")]
    GoodsNotFound(GoodsId),

    /// A good in the cart is off sale.
    #[error("Goods {0} is not on sale")]
    GoodsOffSale(GoodsId),

    /// The catalog reports less stock than the cart asks for.
    #[error("Insufficient stock for goods {goods_id}: {available} available, {requested} requested")]
    InsufficientStock {
        goods_id: GoodsId,
        available: i32,
        requested: i32,
    },

    /// No order matches the key (or it belongs to another user).
    #[error("Order not found: {0}")]
    OrderNotFound(OrderKey),

    /// The requested status change is not in the transition table.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order's status does not allow deletion.
    #[error("Order in status {0} cannot be deleted")]
    NotDeletable(OrderStatus),

    /// The order changed between read and conditional write.
    #[error("Order {0} was modified concurrently")]
    Conflict(OrderId),

    /// A lock could not be taken; the caller should retry later.
    #[error("Resource busy, retry later: {key}")]
    Busy { key: String },

    /// Catalog service error.
    #[error("Catalog service error: {0}")]
    Catalog(String),

    /// User service error.
    #[error("User service error: {0}")]
    UserService(String),

    /// Inventory error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Order storage error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Lock store error.
    #[error("Lock error: {0}")]
    Lock(#[source] LockError),
}

impl From<LockError> for SagaError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy { key, .. } => SagaError::Busy { key },
            other => SagaError::Lock(other),
        }
    }
}

impl SagaError {
    /// Returns true for errors that clear up on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::Busy { .. } | SagaError::Conflict(_) => true,
            SagaError::Inventory(e) => matches!(
                e,
                InventoryError::Busy(_) | InventoryError::Aborted { .. }
            ),
            _ => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
