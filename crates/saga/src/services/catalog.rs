//! Catalog service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::GoodsId;
use domain::Money;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SagaError;

/// What the catalog knows about a good at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsInfo {
    pub id: GoodsId,
    pub name: String,
    pub shop_price: Money,
    pub goods_front_image: String,
    pub on_sale: bool,
    /// Stock as last reported by the catalog; advisory only.
    pub stocks: i32,
}

/// Trait for catalog lookups.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Fetches every known good among `ids` in one call. Unknown ids are
    /// simply absent from the result.
    async fn batch_get_goods(&self, ids: &[GoodsId]) -> Result<Vec<GoodsInfo>, SagaError>;
}

#[async_trait]
impl<T: CatalogService + ?Sized> CatalogService for Arc<T> {
    async fn batch_get_goods(&self, ids: &[GoodsId]) -> Result<Vec<GoodsInfo>, SagaError> {
        (**self).batch_get_goods(ids).await
    }
}

/// In-memory catalog for testing and for running without a catalog service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    goods: Arc<RwLock<HashMap<GoodsId, GoodsInfo>>>,
    fail_on_lookup: Arc<AtomicBool>,
}

impl InMemoryCatalogService {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a good.
    pub async fn upsert(&self, goods: GoodsInfo) {
        self.goods.write().await.insert(goods.id, goods);
    }

    /// Flips a good's on-sale flag. Returns false if the good is unknown.
    pub async fn set_on_sale(&self, id: GoodsId, on_sale: bool) -> bool {
        match self.goods.write().await.get_mut(&id) {
            Some(goods) => {
                goods.on_sale = on_sale;
                true
            }
            None => false,
        }
    }

    /// Configures the catalog to fail every lookup.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.fail_on_lookup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn batch_get_goods(&self, ids: &[GoodsId]) -> Result<Vec<GoodsInfo>, SagaError> {
        if self.fail_on_lookup.load(Ordering::SeqCst) {
            return Err(SagaError::Catalog("catalog unavailable".to_string()));
        }

        let goods = self.goods.read().await;
        Ok(ids.iter().filter_map(|id| goods.get(id).cloned()).collect())
    }
}
