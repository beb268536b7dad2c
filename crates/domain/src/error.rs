//! Domain error types.

use thiserror::Error;

use crate::order::{OrderKey, UnknownStatus};

/// Errors that can occur in order storage.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No order matches the key.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderKey),

    /// The order number is already taken.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderSn(String),

    /// A stored status string is not a known status.
    #[error(transparent)]
    InvalidStatus(#[from] UnknownStatus),

    /// A commit was refused by the store.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
