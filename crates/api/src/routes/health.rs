//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::OrderStore;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Stock a failed compensation left for an operator to restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reconciliations: Option<usize>,
}

/// GET /health: liveness plus an order store check.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.orders.reconciliations().await {
        Ok(records) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                pending_reconciliations: Some(records.len()),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "order store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    pending_reconciliations: None,
                }),
            )
        }
    }
}
