//! HTTP-level tests for the fetcher, clients and source scans.

mod common;

use common::*;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_core::StockSource;
use tally_sync::erp::ErpClient;
use tally_sync::marketplace::MarketplaceClient;
use tally_sync::sources::{scan_erp, scan_fulfillment};
use tally_sync::{StopReason, SyncError};

fn marketplace(server: &MockServer) -> MarketplaceClient {
    MarketplaceClient::new(static_api(&server.uri()), SELLER_ID, fast_policy(), Duration::ZERO)
}

fn erp(server: &MockServer) -> ErpClient {
    ErpClient::new(
        static_api(&format!("{}/erp", server.uri())),
        fast_policy(),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_erp_repeating_page_stops_after_three_fetches() {
    let server = MockServer::start().await;

    // Same page for every offset.
    Mock::given(method("GET"))
        .and(path("/erp/produtos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                erp_product("A", Some(1.0), None),
                erp_product("B", Some(2.0), None),
                erp_product("C", Some(3.0), None),
            ]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = erp(&server).products(100).await.unwrap();

    assert_eq!(outcome.items.len(), 3);
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.stop, StopReason::LoopDetected);
}

#[tokio::test]
async fn test_rate_limited_lookup_retries_with_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MLB1"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/MLB1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(item_detail("MLB1", Some("CAP-001"), Some("UP-A"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let detail = marketplace(&server).item_detail("MLB1").await.unwrap();

    assert_eq!(detail.seller_sku(), Some("CAP-001"));
    // 10ms then 20ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_rate_limit_past_budget_is_fetch_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MLB1"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = marketplace(&server).item_detail("MLB1").await.unwrap_err();
    assert!(matches!(err, SyncError::FetchExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/DENIED"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/BROKEN"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/GARBLED"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = marketplace(&server);

    let denied = client.item_detail("DENIED").await.unwrap_err();
    assert!(matches!(denied, SyncError::AuthFailure(_)));
    assert!(denied.is_cycle_fatal());

    let broken = client.item_detail("BROKEN").await.unwrap_err();
    match broken {
        SyncError::Transport(message) => {
            assert!(message.contains("item BROKEN"));
            assert!(message.contains("500"));
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }

    let garbled = client.item_detail("GARBLED").await.unwrap_err();
    assert!(matches!(garbled, SyncError::Decode(_)));
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/MLB9"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_detail("MLB9", None, None)))
        .expect(1)
        .mount(&server)
        .await;

    marketplace(&server).item_detail("MLB9").await.unwrap();
}

#[tokio::test]
async fn test_fulfillment_scan_groups_links_by_sku() {
    let server = MockServer::start().await;
    mount_fulfillment(&server).await;

    let scan = scan_fulfillment(&marketplace(&server), 50).await.unwrap();

    assert_eq!(scan.items_seen, 3);
    assert_eq!(scan.quantities.source(), StockSource::Fulfillment);
    assert_eq!(scan.quantities.get("CAP-001"), Some(7));
    assert_eq!(scan.quantities.len(), 1);
    assert_eq!(scan.dropped, vec!["MLB3"]);
    assert!(scan.is_complete());
}

#[tokio::test]
async fn test_failed_link_lookup_excludes_sku() {
    let server = MockServer::start().await;

    mount_item_search(&server, &["MLB1", "MLB2", "MLB4"]).await;
    mount_json(&server, "/items/MLB1", item_detail("MLB1", Some("CAP-001"), Some("UP-A"))).await;
    mount_json(&server, "/items/MLB2", item_detail("MLB2", Some("CAP-001"), Some("UP-B"))).await;
    mount_json(&server, "/items/MLB4", item_detail("MLB4", Some("CAP-004"), Some("UP-D"))).await;
    mount_json(&server, "/user-products/UP-A/stock", stock(&[("fulfillment", 4)])).await;
    Mock::given(method("GET"))
        .and(path("/user-products/UP-B/stock"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_json(&server, "/user-products/UP-D/stock", stock(&[("fulfillment", 2)])).await;

    let scan = scan_fulfillment(&marketplace(&server), 50).await.unwrap();

    assert_eq!(scan.quantities.get("CAP-001"), None);
    assert_eq!(scan.quantities.get("CAP-004"), Some(2));
    assert_eq!(scan.excluded, vec!["CAP-001"]);
    assert_eq!(scan.errors.len(), 1);
    assert!(!scan.is_complete());
}

#[tokio::test]
async fn test_failed_item_detail_counts_remaining_listings() {
    let server = MockServer::start().await;

    mount_item_search(&server, &["MLB1", "MLB2"]).await;
    mount_json(&server, "/items/MLB1", item_detail("MLB1", Some("CAP-001"), Some("UP-A"))).await;
    Mock::given(method("GET"))
        .and(path("/items/MLB2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_json(
        &server,
        "/user-products/UP-A/stock",
        stock(&[("fulfillment", 4), ("selling_address", 10)]),
    )
    .await;

    let scan = scan_fulfillment(&marketplace(&server), 50).await.unwrap();

    assert_eq!(scan.quantities.get("CAP-001"), Some(4));
    assert!(scan.excluded.is_empty());
    assert_eq!(scan.errors.len(), 1);
    assert_eq!(scan.errors[0].key, "MLB2");
    assert!(!scan.is_complete());
}

#[tokio::test]
async fn test_erp_scan_folds_products() {
    let server = MockServer::start().await;
    mount_erp(&server).await;

    let scan = scan_erp(&erp(&server), 100).await.unwrap();

    assert_eq!(scan.products_seen, 2);
    assert_eq!(scan.quantities.get("CAP-001"), Some(5));
    assert_eq!(scan.quantities.get("CAP-002"), Some(2));
    assert_eq!(scan.stop, StopReason::EndOfData);
    assert!(scan.is_complete());
}
