//! Order creation, lookup, status update and deletion endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, UserId};
use domain::{OrderInfo, OrderKey, OrderStatus};
use saga::{CreateOrderRequest, OrderDetail};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

/// Optional owner filter: when given, the order must belong to this user.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: Option<i32>,
}

impl OwnerQuery {
    fn user_id(&self) -> Option<UserId> {
        self.user_id.map(UserId::new)
    }
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// POST /orders: turn the user's checked cart rows into an order.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetail>), ApiError> {
    let detail = state.saga.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /orders/{id}: an order with its line items.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(owner): Query<OwnerQuery>,
) -> Result<Json<OrderDetail>, ApiError> {
    let detail = state
        .lifecycle
        .order_detail(OrderId::new(id), owner.user_id())
        .await?;
    Ok(Json(detail))
}

/// PUT /orders/{id}/status: move an order addressed by id.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderInfo>, ApiError> {
    let order = state
        .lifecycle
        .update_status(OrderKey::Id(OrderId::new(id)), req.status)
        .await?;
    Ok(Json(order))
}

/// PUT /orders/sn/{order_sn}/status: move an order addressed by order number.
#[tracing::instrument(skip(state, req))]
pub async fn update_status_by_sn(
    State(state): State<Arc<AppState>>,
    Path(order_sn): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderInfo>, ApiError> {
    let order = state
        .lifecycle
        .update_status(OrderKey::Sn(order_sn), req.status)
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/{id}: delete an order, returning its stock if it still
/// holds any.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(owner): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .lifecycle
        .delete_order(OrderId::new(id), owner.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
