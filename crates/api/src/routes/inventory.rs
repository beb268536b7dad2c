//! Stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::GoodsId;
use inventory::{StockLine, StockRecord};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SetInventoryRequest {
    pub num: i32,
}

#[derive(Deserialize)]
pub struct StockLinesRequest {
    pub items: Vec<StockLine>,
}

#[derive(Serialize)]
pub struct InventoryResponse {
    pub goods_id: GoodsId,
    pub num: i32,
}

/// PUT /inventory/{goods_id}: set the stock of a good.
#[tracing::instrument(skip(state, req))]
pub async fn set(
    State(state): State<Arc<AppState>>,
    Path(goods_id): Path<i32>,
    Json(req): Json<SetInventoryRequest>,
) -> Result<Json<StockRecord>, ApiError> {
    let record = state
        .inventory
        .set_inventory(GoodsId::new(goods_id), req.num)
        .await?;
    Ok(Json(record))
}

/// GET /inventory/{goods_id}: current stock, zero when the good has no record.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(goods_id): Path<i32>,
) -> Result<Json<InventoryResponse>, ApiError> {
    let goods_id = GoodsId::new(goods_id);
    let num = state.inventory.get_inventory(goods_id).await?;
    Ok(Json(InventoryResponse { goods_id, num }))
}

/// POST /inventory/sell: take stock for every line, all or nothing.
#[tracing::instrument(skip(state, req))]
pub async fn sell(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StockLinesRequest>,
) -> Result<StatusCode, ApiError> {
    state.inventory.sell(&req.items).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /inventory/reback: return stock for every line, all or nothing.
#[tracing::instrument(skip(state, req))]
pub async fn reback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StockLinesRequest>,
) -> Result<StatusCode, ApiError> {
    state.inventory.reback(&req.items).await?;
    Ok(StatusCode::NO_CONTENT)
}
