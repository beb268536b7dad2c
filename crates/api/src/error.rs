//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use inventory::InventoryError;
use locks::LockError;
use saga::SagaError;
use thiserror::Error;

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The database could not be reached.
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed to apply.
    #[error("Migrations failed: {0}")]
    Migration(#[from] DomainError),

    /// The lock store could not be reached.
    #[error("Lock store connection failed: {0}")]
    LockStore(#[from] LockError),
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Inventory error.
    Inventory(InventoryError),
    /// Order storage error.
    Domain(DomainError),
    /// Order flow error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Inventory(err) => (inventory_status(&err), err.to_string()),
            ApiError::Domain(err) => (domain_status(&err), err.to_string()),
            ApiError::Saga(err) => (saga_status(&err), err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InsufficientStock { .. }
        | InventoryError::VersionConflict { .. }
        | InventoryError::Aborted { .. } => StatusCode::CONFLICT,
        InventoryError::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
        InventoryError::Lock(_) | InventoryError::Database(_) | InventoryError::Migration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::DuplicateOrderSn(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SagaError::UserNotFound(_)
        | SagaError::GoodsNotFound(_)
        | SagaError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::EmptyCart(_)
        | SagaError::GoodsOffSale(_)
        | SagaError::InvalidTransition { .. }
        | SagaError::NotDeletable(_) => StatusCode::PRECONDITION_FAILED,
        SagaError::InsufficientStock { .. } | SagaError::Conflict(_) => StatusCode::CONFLICT,
        SagaError::Busy { .. } => StatusCode::TOO_MANY_REQUESTS,
        SagaError::Inventory(e) => inventory_status(e),
        SagaError::Domain(e) => domain_status(e),
        SagaError::Catalog(_) | SagaError::UserService(_) | SagaError::Lock(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
