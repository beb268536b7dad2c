//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    let (state, _reaper) = api::create_default_state();
    api::create_app(state, get_metrics_handle())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Registers user 1, lists two goods, stocks them and fills the cart.
async fn seed(app: &Router) {
    assert_eq!(send(app, "PUT", "/users/1", None).await.0, StatusCode::CREATED);

    for (id, name, price, stock) in [(1, "Tea", 250, 10), (2, "Cake", 1000, 5)] {
        let (status, _) = send(
            app,
            "PUT",
            &format!("/goods/{id}"),
            Some(json!({ "name": name, "shop_price": price, "stocks": 100 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            app,
            "PUT",
            &format!("/inventory/{id}"),
            Some(json!({ "num": stock })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    for (goods_id, nums) in [(1, 2), (2, 1)] {
        let (status, _) = send(
            app,
            "POST",
            "/users/1/cart",
            Some(json!({ "goods_id": goods_id, "nums": nums })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn order_request(user_id: i32) -> Value {
    json!({
        "user_id": user_id,
        "address": "1 Main St",
        "name": "Ada",
        "mobile": "13800000000",
        "post": ""
    })
}

async fn stock(app: &Router, goods_id: i32) -> i64 {
    let (status, body) = send(app, "GET", &format!("/inventory/{goods_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    body["num"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending_reconciliations"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_inventory_sell_and_reback() {
    let app = setup();

    let (status, record) = send(&app, "PUT", "/inventory/42", Some(json!({ "num": 10 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["stock"], 10);

    let sell = json!({ "items": [{ "goods_id": 42, "num": 4 }] });
    let (status, _) = send(&app, "POST", "/inventory/sell", Some(sell)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(stock(&app, 42).await, 6);

    let oversell = json!({ "items": [{ "goods_id": 42, "num": 10 }] });
    let (status, body) = send(&app, "POST", "/inventory/sell", Some(oversell)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));
    assert_eq!(stock(&app, 42).await, 6);

    let reback = json!({ "items": [{ "goods_id": 42, "num": 4 }] });
    let (status, _) = send(&app, "POST", "/inventory/reback", Some(reback)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(stock(&app, 42).await, 10);
}

#[tokio::test]
async fn test_inventory_errors() {
    let app = setup();

    assert_eq!(stock(&app, 7).await, 0);

    let unknown = json!({ "items": [{ "goods_id": 7, "num": 1 }] });
    let (status, _) = send(&app, "POST", "/inventory/sell", Some(unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/inventory/sell", Some(json!({ "items": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "PUT", "/inventory/7", Some(json!({ "num": -1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_from_cart() {
    let app = setup();
    seed(&app).await;

    let (status, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(detail["order"]["status"], "WAIT_BUYER_PAY");
    assert_eq!(detail["order"]["order_mount"], 1500);
    assert_eq!(detail["lines"].as_array().unwrap().len(), 2);

    assert_eq!(stock(&app, 1).await, 8);
    assert_eq!(stock(&app, 2).await, 4);

    let (_, cart) = send(&app, "GET", "/users/1/cart", None).await;
    assert!(cart.as_array().unwrap().is_empty());

    let id = detail["order"]["id"].as_i64().unwrap();
    let (status, fetched) = send(&app, "GET", &format!("/orders/{id}?user_id=1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, detail);

    let (status, _) = send(&app, "GET", &format!("/orders/{id}?user_id=2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send(&app, "GET", "/users/1/orders", None).await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cart_rows_can_be_unchecked_and_removed() {
    let app = setup();
    seed(&app).await;

    let (status, row) = send(
        &app,
        "PUT",
        "/users/1/cart/2",
        Some(json!({ "checked": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["checked"], false);
    assert_eq!(row["nums"], 1);

    let (status, row) = send(&app, "PUT", "/users/1/cart/1", Some(json!({ "nums": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(row["nums"], 3);

    let (status, _) = send(&app, "PUT", "/users/1/cart/1", Some(json!({ "nums": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, "PUT", "/users/1/cart/9", Some(json!({ "nums": 1 }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Only the still-checked row is ordered; the unchecked one stays.
    let (status, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(detail["order"]["order_mount"], 750);
    assert_eq!(stock(&app, 2).await, 5);

    let (_, cart) = send(&app, "GET", "/users/1/cart", None).await;
    assert_eq!(cart.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/users/1/cart/2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/users/1/cart/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, cart) = send(&app, "GET", "/users/1/cart", None).await;
    assert!(cart.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_order_list_paging_and_status_filter() {
    let app = setup();
    seed(&app).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        send(&app, "POST", "/users/1/cart", Some(json!({ "goods_id": 1, "nums": 1 }))).await;
        let (status, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(detail["order"]["id"].as_i64().unwrap());
    }
    send(
        &app,
        "PUT",
        &format!("/orders/{}/status", ids[0]),
        Some(json!({ "status": "PAYING" })),
    )
    .await;

    let (status, page) = send(&app, "GET", "/users/1/orders?page=2&page_size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    let orders = page["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"].as_i64(), Some(ids[0]));

    let (_, page) = send(&app, "GET", "/users/1/orders?status=PAYING", None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["orders"][0]["status"], "PAYING");

    let (status, _) = send(&app, "GET", "/users/1/orders?status=BOGUS", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_rejections() {
    let app = setup();

    let (status, _) = send(&app, "POST", "/orders", Some(order_request(9))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "PUT", "/users/9", None).await;
    let (status, body) = send(&app, "POST", "/orders", Some(order_request(9))).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(body["error"].as_str().is_some());

    let mut missing_address = order_request(9);
    missing_address["address"] = json!("");
    let (status, _) = send(&app, "POST", "/orders", Some(missing_address)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_order_short_stock_is_conflict() {
    let app = setup();
    seed(&app).await;
    send(&app, "PUT", "/inventory/2", Some(json!({ "num": 0 }))).await;

    let (status, _) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(stock(&app, 1).await, 10);

    let (_, cart) = send(&app, "GET", "/users/1/cart", None).await;
    assert_eq!(cart.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_status_updates() {
    let app = setup();
    seed(&app).await;
    let (_, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    let id = detail["order"]["id"].as_i64().unwrap();
    let sn = detail["order"]["order_sn"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/orders/{id}/status"),
        Some(json!({ "status": "TRADE_FINISHED" })),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, order) = send(
        &app,
        "PUT",
        &format!("/orders/{id}/status"),
        Some(json!({ "status": "PAYING" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PAYING");

    let (status, order) = send(
        &app,
        "PUT",
        &format!("/orders/sn/{sn}/status"),
        Some(json!({ "status": "TRADE_SUCCESS" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!order["pay_time"].is_null());

    let (status, _) = send(&app, "DELETE", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, _) = send(
        &app,
        "PUT",
        "/orders/sn/unknown/status",
        Some(json!({ "status": "PAYING" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_and_delete_return_stock() {
    let app = setup();
    seed(&app).await;
    let (_, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    let id = detail["order"]["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/orders/{id}/status"),
        Some(json!({ "status": "TRADE_CLOSED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock(&app, 1).await, 10);

    let (status, _) = send(&app, "DELETE", &format!("/orders/{id}?user_id=2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", &format!("/orders/{id}?user_id=1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(stock(&app, 1).await, 10);

    let (status, _) = send(&app, "GET", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_open_order_returns_stock() {
    let app = setup();
    seed(&app).await;
    let (_, detail) = send(&app, "POST", "/orders", Some(order_request(1))).await;
    let id = detail["order"]["id"].as_i64().unwrap();
    assert_eq!(stock(&app, 2).await, 4);

    let (status, _) = send(&app, "DELETE", &format!("/orders/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(stock(&app, 2).await, 5);
}

#[tokio::test]
async fn test_goods_lookup() {
    let app = setup();

    let (status, _) = send(&app, "GET", "/goods/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "PUT",
        "/goods/5",
        Some(json!({ "name": "Jam", "shop_price": 300, "stocks": 3, "on_sale": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, goods) = send(&app, "GET", "/goods/5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(goods["on_sale"], false);
    assert_eq!(goods["shop_price"], 300);
}

#[tokio::test]
async fn test_invalid_user_id_is_bad_request() {
    let app = setup();

    let (status, _) = send(&app, "PUT", "/users/0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, "PUT", "/users/3", None).await.0, StatusCode::CREATED);
    assert_eq!(send(&app, "PUT", "/users/3", None).await.0, StatusCode::OK);
}
