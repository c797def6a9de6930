//! End-to-end sync cycles against mock APIs and an in-memory store.

mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_core::{Money, RunOutcome, StockSource, SyncStage};
use tally_sync::SyncAgent;

async fn mount_happy_path(server: &MockServer) {
    mount_token(server).await;
    mount_fulfillment(server).await;
    mount_erp(server).await;
    mount_orders(server, vec![order(2000001, "CAP-001", 2, 50.0, Some(44001))]).await;
    mount_shipment(server, 44001, "fulfillment", 20.0).await;
}

#[tokio::test]
async fn test_full_cycle_reconciles_and_records_sales() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let db = memory_db().await;

    let agent = SyncAgent::new(test_config(&server), db.clone()).unwrap();
    let report = agent.run_cycle(None).await;

    assert_eq!(report.exit_code(), 0, "{report:#?}");
    assert_eq!(report.stages.len(), 3);

    let cap1 = db.stock().get("CAP-001").await.unwrap().unwrap();
    assert_eq!(cap1.quantity_of(StockSource::Fulfillment), 7);
    assert_eq!(cap1.quantity_of(StockSource::Erp), 5);
    assert_eq!(cap1.total, 12);

    let cap2 = db.stock().get("CAP-002").await.unwrap().unwrap();
    assert_eq!(cap2.total, 2);

    for record in db.stock().all().await.unwrap() {
        assert!(record.check_total().is_ok(), "{record:?}");
    }

    assert_eq!(db.sales_ledger().count().await.unwrap(), 1);
    let entry = db.sales_ledger().get("2000001").await.unwrap().unwrap();
    assert_eq!(entry.sku.as_deref(), Some("CAP-001"));
    assert_eq!(entry.net_revenue, Money::from_cents(8019));
    assert!(!entry.cost_known);

    // One fulfillment SKU plus two ERP SKUs.
    assert_eq!(db.history().count().await.unwrap(), 3);
    assert_eq!(db.sync_runs().recent(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_second_cycle_writes_nothing_new() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let db = memory_db().await;

    let agent = SyncAgent::new(test_config(&server), db.clone()).unwrap();
    agent.run_cycle(None).await;
    let second = agent.run_cycle(None).await;

    assert_eq!(second.exit_code(), 0);
    for stage in [SyncStage::Fulfillment, SyncStage::Erp] {
        let report = second.stage(stage).unwrap();
        assert_eq!(report.updated + report.inserted, 0, "{stage}");
        assert!(report.skipped > 0);
    }

    let sales = second.stage(SyncStage::Sales).unwrap();
    assert_eq!(sales.inserted, 0);
    assert_eq!(sales.skipped, 1);
    assert_eq!(db.sales_ledger().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_known_purchase_cost_prices_the_order() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let db = memory_db().await;

    let agent = SyncAgent::new(test_config(&server), db.clone()).unwrap();
    agent.run_cycle(Some(SyncStage::Erp)).await;
    db.stock()
        .set_purchase_cost("CAP-001", Some(Money::from_cents(1000)))
        .await
        .unwrap();

    let report = agent.run_cycle(Some(SyncStage::Sales)).await;
    assert_eq!(report.exit_code(), 0);

    let entry = db.sales_ledger().get("2000001").await.unwrap().unwrap();
    assert!(entry.cost_known);
    assert_eq!(entry.profit, Money::from_cents(6019));
    assert_eq!(entry.margin_pct, Some(60.19));
}

#[tokio::test]
async fn test_token_failure_aborts_before_any_work() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;
    mount_fulfillment(&server).await;
    let db = memory_db().await;

    let report = SyncAgent::new(test_config(&server), db.clone())
        .unwrap()
        .run_cycle(None)
        .await;

    assert!(report.is_aborted());
    assert_eq!(report.exit_code(), 1);
    assert!(report.stages.is_empty());
    assert!(db.stock().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_erp_outage_fails_only_its_stage() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_fulfillment(&server).await;
    Mock::given(method("GET"))
        .and(path("/erp/produtos"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    mount_orders(&server, vec![order(2000001, "CAP-001", 2, 50.0, Some(44001))]).await;
    mount_shipment(&server, 44001, "fulfillment", 20.0).await;
    let db = memory_db().await;

    let report = SyncAgent::new(test_config(&server), db.clone())
        .unwrap()
        .run_cycle(None)
        .await;

    assert!(!report.is_aborted());
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.stage(SyncStage::Erp).unwrap().outcome, RunOutcome::Failed);
    assert_eq!(
        report.stage(SyncStage::Sales).unwrap().outcome,
        RunOutcome::Succeeded
    );
    assert_eq!(db.stock().get("CAP-001").await.unwrap().unwrap().total, 7);
}

#[tokio::test]
async fn test_shipment_failure_skips_only_that_order() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_orders(
        &server,
        vec![
            order(2000001, "CAP-001", 1, 90.0, Some(44001)),
            order(2000002, "CAP-002", 1, 30.0, Some(44002)),
        ],
    )
    .await;
    mount_shipment(&server, 44001, "self_service", 12.0).await;
    Mock::given(method("GET"))
        .and(path("/shipments/44002"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let db = memory_db().await;

    let report = SyncAgent::new(test_config(&server), db.clone())
        .unwrap()
        .run_cycle(Some(SyncStage::Sales))
        .await;

    let sales = report.stage(SyncStage::Sales).unwrap();
    assert_eq!(sales.outcome, RunOutcome::Partial);
    assert_eq!(sales.inserted, 1);
    assert_eq!(sales.errors.len(), 1);
    assert_eq!(sales.errors[0].key, "2000002");
    assert_eq!(report.exit_code(), 2);
    assert!(!db.sales_ledger().contains("2000002").await.unwrap());
}

#[tokio::test]
async fn test_disabled_stage_is_skipped() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_erp(&server).await;
    let db = memory_db().await;

    let mut config = test_config(&server);
    config.marketplace.enabled = false;
    config.sales.enabled = false;

    let report = SyncAgent::new(config, db.clone()).unwrap().run_cycle(None).await;

    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.stage(SyncStage::Fulfillment).unwrap().outcome,
        RunOutcome::Skipped
    );
    assert_eq!(report.stage(SyncStage::Erp).unwrap().inserted, 2);
}

#[tokio::test]
async fn test_corrupt_stock_row_leaves_cycle_running() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let db = memory_db().await;
    sqlx::query(
        "INSERT INTO stock (sku, source_quantities, total, created_at, updated_at) VALUES ('BAD', '{\"erp\": 1.5}', 1, ?1, ?1)",
    )
    .bind(chrono::Utc::now())
    .execute(db.pool())
    .await
    .unwrap();

    let report = SyncAgent::new(test_config(&server), db.clone())
        .unwrap()
        .run_cycle(None)
        .await;

    assert!(!report.is_aborted(), "{report:#?}");
    assert_eq!(report.exit_code(), 2);
    let erp = report.stage(SyncStage::Erp).unwrap();
    assert_eq!(erp.outcome, RunOutcome::Partial);
    assert_eq!(erp.inserted, 1);
    assert!(erp.errors.iter().any(|e| e.key == "BAD"));
    assert_eq!(
        report.stage(SyncStage::Sales).unwrap().outcome,
        RunOutcome::Succeeded
    );
    assert_eq!(db.stock().get("CAP-001").await.unwrap().unwrap().total, 12);
    assert_eq!(db.stock().get("CAP-002").await.unwrap().unwrap().total, 2);
}
