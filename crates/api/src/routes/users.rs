//! User and cart support endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{GoodsId, UserId};
use domain::{CartItemUpdate, OrderFilter, OrderPage, OrderStatus, OrderStore, ShoppingCartItem};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct AddToCartRequest {
    pub goods_id: GoodsId,
    pub nums: i32,
    #[serde(default = "checked_default")]
    pub checked: bool,
}

fn checked_default() -> bool {
    true
}

/// Paging and status filter for the order list.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<OrderStatus>,
}

fn user_id(raw: i32) -> Result<UserId, ApiError> {
    let id = UserId::new(raw);
    if !id.is_valid() {
        return Err(ApiError::BadRequest(format!("invalid user id {raw}")));
    }
    Ok(id)
}

/// PUT /users/{user_id}: register a user with the directory.
#[tracing::instrument(skip(state))]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = user_id(raw)?;
    if state.users.register(id).await {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

/// POST /users/{user_id}/cart: add goods to the cart, merging into an existing row.
#[tracing::instrument(skip(state, req))]
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<i32>,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<ShoppingCartItem>, ApiError> {
    let id = user_id(raw)?;
    if req.nums <= 0 {
        return Err(ApiError::BadRequest("nums must be positive".to_string()));
    }
    let row = state
        .orders
        .add_to_cart(id, req.goods_id, req.nums, req.checked)
        .await?;
    Ok(Json(row))
}

/// PUT /users/{user_id}/cart/{goods_id}: change the quantity or the checked flag of a row.
#[tracing::instrument(skip(state))]
pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    Path((raw, goods_id)): Path<(i32, i32)>,
    Json(update): Json<CartItemUpdate>,
) -> Result<Json<ShoppingCartItem>, ApiError> {
    let id = user_id(raw)?;
    if update.nums.is_some_and(|n| n <= 0) {
        return Err(ApiError::BadRequest("nums must be positive".to_string()));
    }
    let goods_id = GoodsId::new(goods_id);
    let row = state
        .orders
        .update_cart_item(id, goods_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("goods {goods_id} is not in the cart")))?;
    Ok(Json(row))
}

/// DELETE /users/{user_id}/cart/{goods_id}: remove a row from the cart.
#[tracing::instrument(skip(state))]
pub async fn delete_cart_item(
    State(state): State<Arc<AppState>>,
    Path((raw, goods_id)): Path<(i32, i32)>,
) -> Result<StatusCode, ApiError> {
    let id = user_id(raw)?;
    let goods_id = GoodsId::new(goods_id);
    if !state.orders.delete_cart_item(id, goods_id).await? {
        return Err(ApiError::NotFound(format!("goods {goods_id} is not in the cart")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/{user_id}/cart: every cart row of the user.
#[tracing::instrument(skip(state))]
pub async fn cart(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<i32>,
) -> Result<Json<Vec<ShoppingCartItem>>, ApiError> {
    let rows = state.orders.cart(user_id(raw)?).await?;
    Ok(Json(rows))
}

/// GET /users/{user_id}/orders: one page of the user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn orders(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<i32>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    let filter = OrderFilter::new(query.status, query.page, query.page_size);
    let page = state.lifecycle.list_orders(user_id(raw)?, filter).await?;
    Ok(Json(page))
}
