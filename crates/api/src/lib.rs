//! HTTP API server for stock reservation and order management.
//!
//! Wires the lock store, stock ledger and order store into the inventory
//! service, the order saga, the order lifecycle and the timeout reaper, and
//! exposes them as REST endpoints with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use inventory::{InMemoryStockLedger, InventoryService, PostgresStockLedger, StockLedger};
use locks::{InMemoryLockStore, LockStore, RedisLockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    InMemoryCatalogService, InMemoryUserDirectory, OrderLifecycle, OrderSaga, OrderSagaConfig,
    ReaperConfig, TimeoutReaper,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

pub type SharedLocks = Arc<dyn LockStore>;
pub type SharedLedger = Arc<dyn StockLedger>;
pub type SharedOrders = Arc<dyn OrderStore>;
pub type Inventory = InventoryService<SharedLocks, SharedLedger>;
pub type Saga =
    OrderSaga<SharedLocks, SharedOrders, Inventory, InMemoryCatalogService, InMemoryUserDirectory>;
pub type Lifecycle = OrderLifecycle<SharedLocks, SharedOrders, Inventory>;
pub type Reaper = TimeoutReaper<SharedOrders, Inventory>;

/// The storage backends the services run on.
pub struct Backends {
    pub locks: SharedLocks,
    pub ledger: SharedLedger,
    pub orders: SharedOrders,
}

impl Backends {
    /// Process-local backends; nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            locks: Arc::new(InMemoryLockStore::new()),
            ledger: Arc::new(InMemoryStockLedger::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
        }
    }

    /// Connects the backends named by `config`. PostgreSQL backs stock and
    /// orders when `DATABASE_URL` is set; Redis backs locks when `REDIS_URL`
    /// is set. Anything unset falls back to memory.
    ///
    /// Orders and stock get separate pools. Order flows hold an order
    /// transaction open while they call into the inventory, so stock writes
    /// must never wait on a connection an order transaction is holding.
    pub async fn from_config(config: &Config) -> Result<Self, StartupError> {
        let mut backends = Self::in_memory();

        if let Some(url) = &config.database_url {
            let connect = || {
                PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
            };
            let order_pool = connect().await?;
            let stock_pool = connect().await?;

            let orders = PostgresOrderStore::new(order_pool);
            orders.run_migrations().await?;
            backends.orders = Arc::new(orders);
            backends.ledger = Arc::new(PostgresStockLedger::new(stock_pool));
            tracing::info!(
                max_connections = config.database_max_connections,
                "using PostgreSQL for stock and orders"
            );
        }

        if let Some(url) = &config.redis_url {
            backends.locks = Arc::new(RedisLockStore::connect(url).await?);
            tracing::info!("using Redis for locks");
        }

        Ok(backends)
    }
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub inventory: Inventory,
    pub orders: SharedOrders,
    pub saga: Saga,
    pub lifecycle: Lifecycle,
    pub catalog: InMemoryCatalogService,
    pub users: InMemoryUserDirectory,
}

/// Builds the application state and the reaper over `backends`.
pub fn create_state(backends: Backends, config: &Config) -> (Arc<AppState>, Reaper) {
    let Backends {
        locks,
        ledger,
        orders,
    } = backends;

    let inventory = InventoryService::new(locks.clone(), ledger);
    let catalog = InMemoryCatalogService::new();
    let users = InMemoryUserDirectory::new();

    let saga = OrderSaga::with_config(
        locks.clone(),
        orders.clone(),
        inventory.clone(),
        catalog.clone(),
        users.clone(),
        OrderSagaConfig {
            payment_window: config.payment_window,
            ..OrderSagaConfig::default()
        },
    );
    let lifecycle = OrderLifecycle::new(locks, orders.clone(), inventory.clone());
    let reaper = TimeoutReaper::with_config(
        orders.clone(),
        inventory.clone(),
        ReaperConfig {
            interval: config.reaper_interval,
        },
    );

    let state = Arc::new(AppState {
        inventory,
        orders,
        saga,
        lifecycle,
        catalog,
        users,
    });
    (state, reaper)
}

/// Creates in-memory application state with default configuration.
pub fn create_default_state() -> (Arc<AppState>, Reaper) {
    create_state(Backends::in_memory(), &Config::default())
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/inventory/sell", post(routes::inventory::sell))
        .route("/inventory/reback", post(routes::inventory::reback))
        .route(
            "/inventory/{goods_id}",
            get(routes::inventory::get).put(routes::inventory::set),
        )
        .route(
            "/goods/{goods_id}",
            get(routes::goods::get).put(routes::goods::upsert),
        )
        .route("/users/{user_id}", put(routes::users::register))
        .route(
            "/users/{user_id}/cart",
            get(routes::users::cart).post(routes::users::add_to_cart),
        )
        .route(
            "/users/{user_id}/cart/{goods_id}",
            put(routes::users::update_cart_item).delete(routes::users::delete_cart_item),
        )
        .route("/users/{user_id}/orders", get(routes::users::orders))
        .route("/orders", post(routes::orders::create))
        .route(
            "/orders/{id}",
            get(routes::orders::get).delete(routes::orders::delete),
        )
        .route("/orders/{id}/status", put(routes::orders::update_status))
        .route(
            "/orders/sn/{order_sn}/status",
            put(routes::orders::update_status_by_sn),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
