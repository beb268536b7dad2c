//! PostgreSQL integration tests for the order store.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{GoodsId, UserId};
use domain::{
    CartItemUpdate, DomainError, Money, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter,
    OrderKey, OrderStatus, OrderStore, PostgresOrderStore, ReconciliationLine,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_goods, order_info, shopping_cart, stock_reconciliation")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn draft(user: i32, sn: &str, deadline_in: Duration) -> NewOrder {
    let now = Utc::now();
    NewOrder {
        user_id: UserId::new(user),
        order_sn: sn.to_string(),
        status: OrderStatus::WaitBuyerPay,
        order_mount: Money::zero(),
        pay_deadline: now + deadline_in,
        address: "1 Main St".to_string(),
        signer_name: "Ada".to_string(),
        signer_mobile: "13800000000".to_string(),
        post: "100000".to_string(),
        created_at: now,
    }
}

fn line(goods: i32, price: i64, nums: i32) -> NewOrderGoods {
    NewOrderGoods {
        goods_id: GoodsId::new(goods),
        goods_name: format!("goods {goods}"),
        goods_image: String::new(),
        goods_price: Money::from_cents(price),
        nums,
    }
}

#[tokio::test]
#[serial]
async fn order_with_lines_commits() {
    let store = get_test_store().await;
    let user = UserId::new(7);
    store.add_to_cart(user, GoodsId::new(1), 2, true).await.unwrap();
    store.add_to_cart(user, GoodsId::new(2), 1, false).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let order = tx.insert_order(draft(7, "sn-a", Duration::minutes(30))).await.unwrap();
    let lines = tx
        .insert_order_goods(order.id, &[line(1, 250, 2), line(3, 100, 1)])
        .await
        .unwrap();
    assert_eq!(lines.len(), 2);
    tx.set_order_mount(order.id, Money::from_cents(600)).await.unwrap();
    let checked = tx.checked_cart_for_update(user).await.unwrap();
    let ids: Vec<i64> = checked.iter().map(|c| c.id).collect();
    assert_eq!(tx.delete_cart_items(&ids).await.unwrap(), 1);
    tx.commit().await.unwrap();

    let stored = store.find_order(&OrderKey::Sn("sn-a".into())).await.unwrap().unwrap();
    assert_eq!(stored.order_mount.cents(), 600);
    assert_eq!(stored.status, OrderStatus::WaitBuyerPay);
    assert_eq!(store.order_goods(order.id).await.unwrap().len(), 2);

    let cart = store.cart(user).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert!(!cart[0].checked);
}

#[tokio::test]
#[serial]
async fn dropped_transaction_rolls_back() {
    let store = get_test_store().await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(draft(1, "sn-b", Duration::minutes(30))).await.unwrap();
    }

    assert!(store.find_order(&OrderKey::Sn("sn-b".into())).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn duplicate_sn_maps_to_domain_error() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(draft(1, "sn-c", Duration::minutes(30))).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .insert_order(draft(2, "sn-c", Duration::minutes(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DuplicateOrderSn(_)));
}

#[tokio::test]
#[serial]
async fn transition_and_expiry_scan() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let late = tx.insert_order(draft(1, "sn-late", -Duration::minutes(1))).await.unwrap();
    let fresh = tx.insert_order(draft(1, "sn-fresh", Duration::minutes(30))).await.unwrap();
    for id in [late.id, fresh.id] {
        assert!(tx
            .transition_status(id, OrderStatus::WaitBuyerPay, OrderStatus::Paying, None)
            .await
            .unwrap());
    }
    tx.commit().await.unwrap();

    let expired = store.expired_paying_orders(Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, late.id);

    let paid_at = Utc::now();
    let mut tx = store.begin().await.unwrap();
    assert!(tx
        .transition_status(fresh.id, OrderStatus::Paying, OrderStatus::TradeSuccess, Some(paid_at))
        .await
        .unwrap());
    // Second flip from the stale status matches nothing.
    assert!(!tx
        .transition_status(fresh.id, OrderStatus::Paying, OrderStatus::TradeClosed, None)
        .await
        .unwrap());
    tx.commit().await.unwrap();

    let paid = store.find_order(&OrderKey::Id(fresh.id)).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::TradeSuccess);
    assert!(paid.pay_time.is_some());
}

#[tokio::test]
#[serial]
async fn reconciliation_round_trip() {
    let store = get_test_store().await;

    let stored = store
        .record_reconciliation(NewReconciliation {
            order_sn: Some("sn-x".into()),
            reason: "reback failed".into(),
            lines: vec![ReconciliationLine {
                goods_id: GoodsId::new(4),
                num: 2,
            }],
        })
        .await
        .unwrap();

    let all = store.reconciliations().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].lines, stored.lines);
    assert_eq!(all[0].order_sn.as_deref(), Some("sn-x"));
}

#[tokio::test]
#[serial]
async fn cart_add_during_checkout_is_not_lost() {
    let store = get_test_store().await;
    let user = UserId::new(9);
    store.add_to_cart(user, GoodsId::new(1), 2, true).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let snapshot = tx.checked_cart_for_update(user).await.unwrap();
    assert_eq!(snapshot.len(), 1);

    // Blocks on the locked row until the checkout commits.
    let adder = tokio::spawn({
        let store = store.clone();
        async move { store.add_to_cart(user, GoodsId::new(1), 3, true).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(!adder.is_finished());

    let ids: Vec<i64> = snapshot.iter().map(|c| c.id).collect();
    assert_eq!(tx.delete_cart_items(&ids).await.unwrap(), 1);
    tx.commit().await.unwrap();

    let added = adder.await.unwrap().unwrap();
    assert_eq!(added.nums, 3);
    let cart = store.cart(user).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].nums, 3);
}

#[tokio::test]
#[serial]
async fn cart_rows_update_and_delete() {
    let store = get_test_store().await;
    let user = UserId::new(5);
    store.add_to_cart(user, GoodsId::new(1), 2, true).await.unwrap();

    let row = store
        .update_cart_item(
            user,
            GoodsId::new(1),
            CartItemUpdate {
                nums: Some(4),
                checked: Some(false),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!((row.nums, row.checked), (4, false));

    let row = store
        .update_cart_item(
            user,
            GoodsId::new(1),
            CartItemUpdate {
                nums: None,
                checked: Some(true),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!((row.nums, row.checked), (4, true));

    assert!(store
        .update_cart_item(user, GoodsId::new(2), CartItemUpdate::default())
        .await
        .unwrap()
        .is_none());
    assert!(store.delete_cart_item(user, GoodsId::new(1)).await.unwrap());
    assert!(!store.delete_cart_item(user, GoodsId::new(1)).await.unwrap());
}

#[tokio::test]
#[serial]
async fn user_orders_page_and_filter() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let mut ids = Vec::new();
    for i in 0..3 {
        let order = tx
            .insert_order(draft(1, &format!("sn-p{i}"), Duration::minutes(30)))
            .await
            .unwrap();
        ids.push(order.id);
    }
    tx.insert_order(draft(2, "sn-other", Duration::minutes(30))).await.unwrap();
    tx.transition_status(ids[0], OrderStatus::WaitBuyerPay, OrderStatus::Paying, None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let page = store
        .user_orders(UserId::new(1), &OrderFilter::new(None, Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(
        page.orders.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![ids[2], ids[1]]
    );

    let page = store
        .user_orders(UserId::new(1), &OrderFilter::new(None, Some(2), Some(2)))
        .await
        .unwrap();
    assert_eq!(page.orders.len(), 1);
    assert_eq!(page.orders[0].id, ids[0]);

    let paying = store
        .user_orders(UserId::new(1), &OrderFilter::new(Some(OrderStatus::Paying), None, None))
        .await
        .unwrap();
    assert_eq!(paying.total, 1);
    assert_eq!(paying.orders[0].id, ids[0]);
}
