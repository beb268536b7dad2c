//! Catalog support endpoints used to seed the goods an order is priced from.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::GoodsId;
use domain::Money;
use saga::{CatalogService, GoodsInfo};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct UpsertGoodsRequest {
    pub name: String,
    pub shop_price: Money,
    #[serde(default)]
    pub goods_front_image: String,
    #[serde(default = "on_sale_default")]
    pub on_sale: bool,
    pub stocks: i32,
}

fn on_sale_default() -> bool {
    true
}

/// PUT /goods/{goods_id}: create or replace a catalog entry.
#[tracing::instrument(skip(state, req))]
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(goods_id): Path<i32>,
    Json(req): Json<UpsertGoodsRequest>,
) -> Result<Json<GoodsInfo>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    if req.shop_price.is_negative() {
        return Err(ApiError::BadRequest("shop_price cannot be negative".to_string()));
    }

    let goods = GoodsInfo {
        id: GoodsId::new(goods_id),
        name: req.name,
        shop_price: req.shop_price,
        goods_front_image: req.goods_front_image,
        on_sale: req.on_sale,
        stocks: req.stocks,
    };
    state.catalog.upsert(goods.clone()).await;
    Ok(Json(goods))
}

/// GET /goods/{goods_id}: a catalog entry.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(goods_id): Path<i32>,
) -> Result<Json<GoodsInfo>, ApiError> {
    state
        .catalog
        .batch_get_goods(&[GoodsId::new(goods_id)])
        .await?
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Goods {goods_id} not found")))
}
