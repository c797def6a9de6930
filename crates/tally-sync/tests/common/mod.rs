//! Shared fixtures for tally-sync integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_db::{Database, DbConfig};
use tally_sync::auth::StaticTokenProvider;
use tally_sync::http::ApiClient;
use tally_sync::{RetryPolicy, SyncConfig};

pub const SELLER_ID: &str = "1100552101";

/// Config pointing every API at the mock server, with fast retries.
pub fn test_config(server: &MockServer) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.marketplace.api_base = server.uri();
    config.marketplace.token_url = format!("{}/oauth/token", server.uri());
    config.marketplace.seller_id = SELLER_ID.to_string();
    config.marketplace.client_id = "client".to_string();
    config.marketplace.client_secret = "secret".to_string();
    config.marketplace.refresh_token = "TG-refresh".to_string();
    config.erp.api_base = format!("{}/erp", server.uri());
    config.erp.access_token = "erp-token".to_string();
    config.fetch.initial_delay_ms = 10;
    config.fetch.page_delay_ms = 0;
    config.fetch.request_timeout_secs = 5;
    config
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

/// API client for `base` with a fixed bearer token.
pub fn static_api(base: &str) -> ApiClient {
    ApiClient::new(
        reqwest::Client::new(),
        base,
        Arc::new(StaticTokenProvider::new("test-token")),
    )
    .unwrap()
}

// =============================================================================
// Payload factories
// =============================================================================

pub fn item_detail(id: &str, sku: Option<&str>, user_product: Option<&str>) -> Value {
    let mut attributes = vec![json!({"id": "BRAND", "value_name": "Acme"})];
    if let Some(sku) = sku {
        attributes.push(json!({"id": "SELLER_SKU", "value_name": sku}));
    }
    json!({
        "id": id,
        "user_product_id": user_product,
        "attributes": attributes
    })
}

pub fn stock(locations: &[(&str, i64)]) -> Value {
    let locations: Vec<Value> = locations
        .iter()
        .map(|(kind, qty)| json!({"type": kind, "quantity": qty}))
        .collect();
    json!({ "locations": locations })
}

pub fn erp_product(code: &str, virtual_balance: Option<f64>, quantity: Option<f64>) -> Value {
    json!({
        "codigo": code,
        "estoque": {"saldoVirtualTotal": virtual_balance, "quantidade": quantity}
    })
}

pub fn order(id: u64, sku: &str, quantity: i64, unit_price: f64, shipment: Option<u64>) -> Value {
    let mut order = json!({
        "id": id,
        "date_created": "2026-10-05T14:30:00.000-03:00",
        "status": "paid",
        "order_items": [{
            "item": {"id": "MLB1", "seller_sku": sku},
            "quantity": quantity,
            "unit_price": unit_price,
            "sale_fee": 5.0
        }]
    });
    if let Some(shipment) = shipment {
        order["shipping"] = json!({"id": shipment});
    }
    order
}

// =============================================================================
// Mock mounting
// =============================================================================

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "APP_USR-access",
            "token_type": "bearer",
            "expires_in": 21600,
            "refresh_token": "TG-rotated"
        })))
        .mount(server)
        .await;
}

/// Listing search: all `ids` on the first page, then an empty page.
pub async fn mount_item_search(server: &MockServer, ids: &[&str]) {
    let search = format!("/users/{SELLER_ID}/items/search");
    Mock::given(method("GET"))
        .and(path(search.clone()))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": ids })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(search))
        .and(query_param("offset", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(server)
        .await;
}

pub async fn mount_json(server: &MockServer, url_path: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(url_path.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Three listings: two backing CAP-001 (4 + 3 fulfillment units), one
/// without a SKU.
pub async fn mount_fulfillment(server: &MockServer) {
    mount_item_search(server, &["MLB1", "MLB2", "MLB3"]).await;
    mount_json(server, "/items/MLB1", item_detail("MLB1", Some("CAP-001"), Some("UP-A"))).await;
    mount_json(server, "/items/MLB2", item_detail("MLB2", Some(" CAP-001 "), Some("UP-B"))).await;
    mount_json(server, "/items/MLB3", item_detail("MLB3", None, Some("UP-C"))).await;
    mount_json(
        server,
        "/user-products/UP-A/stock",
        stock(&[("fulfillment", 4), ("selling_address", 10)]),
    )
    .await;
    mount_json(server, "/user-products/UP-B/stock", stock(&[("meli_facility", 3)])).await;
}

/// ERP catalogue: CAP-001 = 5, CAP-002 = 2, then an empty page.
pub async fn mount_erp(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/erp/produtos"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                erp_product("CAP-001", Some(5.0), Some(9.0)),
                erp_product("CAP-002", None, Some(2.0)),
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/erp/produtos"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(server)
        .await;
}

/// One order page with `orders`, then an empty page.
pub async fn mount_orders(server: &MockServer, orders: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/orders/search/recent"))
        .and(query_param("seller", SELLER_ID))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": orders })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders/search/recent"))
        .and(query_param("offset", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(server)
        .await;
}

pub async fn mount_shipment(server: &MockServer, id: u64, logistic_type: &str, cost: f64) {
    mount_json(
        server,
        &format!("/shipments/{id}"),
        json!({"id": id, "logistic_type": logistic_type}),
    )
    .await;
    mount_json(
        server,
        &format!("/shipments/{id}/costs"),
        json!({"senders": [{"user_id": 1, "save": cost}]}),
    )
    .await;
}
