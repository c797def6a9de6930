//! # Marketplace Client
//!
//! Listing search, item detail, fulfillment stock, orders and shipments.
//!
//! ## Endpoints
//! ```text
//! GET /users/{seller}/items/search?offset&limit      → {results: [item_id]}
//! GET /items/{id}                                    → {user_product_id, attributes}
//! GET /user-products/{id}/stock                      → {locations: [{type, quantity}]}
//! GET /orders/search/recent?seller&date_created_from&date_created_to&offset&limit
//!                                                    → {results: [order]}
//! GET /shipments/{id}                                → {logistic_type}
//! GET /shipments/{id}/costs                          → {senders: [{save}]}
//! ```
//!
//! Every call goes through `RetryPolicy`; list endpoints go through
//! `Paginator`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::SyncResult;
use crate::fetcher::{FetchOutcome, Page, PageCursor, Paginator, RetryPolicy};
use crate::http::ApiClient;
use tally_core::StockLocation;

/// Attribute id holding the seller's SKU on an item.
pub const SELLER_SKU_ATTRIBUTE: &str = "SELLER_SKU";

// =============================================================================
// Payloads
// =============================================================================

/// An id the API sends either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{n}"),
            RawId::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemSearchResponse {
    #[serde(default)]
    results: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemAttribute {
    pub id: String,
    #[serde(default)]
    pub value_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_product_id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ItemAttribute>,
}

impl ItemDetail {
    /// The `SELLER_SKU` attribute value, if any.
    pub fn seller_sku(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.id == SELLER_SKU_ATTRIBUTE)
            .and_then(|a| a.value_name.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    #[serde(rename = "type")]
    location_type: String,
    #[serde(default)]
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct UserProductStock {
    #[serde(default)]
    locations: Vec<LocationPayload>,
}

#[derive(Debug, Deserialize)]
struct OrderSearchResponse {
    #[serde(default)]
    results: Vec<OrderPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub seller_sku: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemPayload {
    #[serde(default)]
    pub item: Option<OrderItemRef>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub sale_fee: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingRef {
    #[serde(default)]
    pub id: Option<RawId>,
}

/// One order from the recent-orders search.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    pub id: RawId,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_items: Vec<OrderItemPayload>,
    #[serde(default)]
    pub shipping: Option<ShippingRef>,
}

impl OrderPayload {
    pub fn order_id(&self) -> String {
        self.id.to_string()
    }

    pub fn first_item(&self) -> Option<&OrderItemPayload> {
        self.order_items.first()
    }

    pub fn shipment_id(&self) -> Option<String> {
        self.shipping
            .as_ref()
            .and_then(|s| s.id.as_ref())
            .map(|id| id.to_string())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentDetail {
    #[serde(default)]
    pub logistic_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderCost {
    #[serde(default)]
    pub save: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentCosts {
    #[serde(default)]
    pub senders: Vec<SenderCost>,
}

impl ShipmentCosts {
    /// Freight charged to the first sender, 0 when absent.
    pub fn sender_cost(&self) -> f64 {
        self.senders.first().and_then(|s| s.save).unwrap_or(0.0)
    }
}

// =============================================================================
// Shipment Lookup
// =============================================================================

/// Shipment data needed to classify and cost an order.
#[async_trait]
pub trait ShipmentSource: Send + Sync {
    async fn shipment(&self, shipment_id: &str) -> SyncResult<ShipmentDetail>;
    async fn shipment_costs(&self, shipment_id: &str) -> SyncResult<ShipmentCosts>;
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    api: ApiClient,
    seller_id: String,
    policy: RetryPolicy,
    page_delay: Duration,
}

impl MarketplaceClient {
    pub fn new(
        api: ApiClient,
        seller_id: impl Into<String>,
        policy: RetryPolicy,
        page_delay: Duration,
    ) -> Self {
        MarketplaceClient {
            api,
            seller_id: seller_id.into(),
            policy,
            page_delay,
        }
    }

    /// One page of the seller's listing ids.
    pub async fn item_page(&self, cursor: PageCursor) -> SyncResult<Page<String>> {
        let response: ItemSearchResponse = self
            .api
            .get_json(
                "item search",
                &format!("/users/{}/items/search", self.seller_id),
                &[
                    ("offset", cursor.offset.to_string()),
                    ("limit", cursor.limit.to_string()),
                ],
            )
            .await?;
        Ok(Page::from_offset(response.results, cursor))
    }

    /// Every listing id of the seller.
    pub async fn item_ids(&self, page_size: u32) -> SyncResult<FetchOutcome<String>> {
        Paginator::new(
            "item search",
            self.policy,
            PageCursor::first(page_size),
            |cursor| self.item_page(cursor),
        )
        .with_page_delay(self.page_delay)
        .with_loop_detection(|id: &String| id.clone())
        .collect_all()
        .await
    }

    pub async fn item_detail(&self, item_id: &str) -> SyncResult<ItemDetail> {
        let operation = format!("item {item_id}");
        let path = format!("/items/{item_id}");
        self.policy
            .run(&operation, || self.api.get_json(&operation, &path, &[]))
            .await
    }

    /// Stock distribution of one product link.
    pub async fn user_product_stock(&self, product_link: &str) -> SyncResult<Vec<StockLocation>> {
        let operation = format!("user product {product_link} stock");
        let path = format!("/user-products/{product_link}/stock");
        let stock: UserProductStock = self
            .policy
            .run(&operation, || self.api.get_json(&operation, &path, &[]))
            .await?;

        Ok(stock
            .locations
            .into_iter()
            .map(|l| StockLocation {
                location_type: l.location_type,
                quantity: l.quantity,
            })
            .collect())
    }

    /// One page of orders created inside the window.
    pub async fn order_page(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cursor: PageCursor,
    ) -> SyncResult<Page<OrderPayload>> {
        let response: OrderSearchResponse = self
            .api
            .get_json(
                "order search",
                "/orders/search/recent",
                &[
                    ("seller", self.seller_id.clone()),
                    ("date_created_from", format_api_date(from)),
                    ("date_created_to", format_api_date(to)),
                    ("offset", cursor.offset.to_string()),
                    ("limit", cursor.limit.to_string()),
                ],
            )
            .await?;
        Ok(Page::from_offset(response.results, cursor))
    }

    /// Every order created inside the window.
    pub async fn orders(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page_size: u32,
    ) -> SyncResult<FetchOutcome<OrderPayload>> {
        Paginator::new(
            "order search",
            self.policy,
            PageCursor::first(page_size),
            |cursor| self.order_page(from, to, cursor),
        )
        .with_page_delay(self.page_delay)
        .with_loop_detection(|o: &OrderPayload| o.order_id())
        .collect_all()
        .await
    }
}

#[async_trait]
impl ShipmentSource for MarketplaceClient {
    async fn shipment(&self, shipment_id: &str) -> SyncResult<ShipmentDetail> {
        let operation = format!("shipment {shipment_id}");
        let path = format!("/shipments/{shipment_id}");
        self.policy
            .run(&operation, || self.api.get_json(&operation, &path, &[]))
            .await
    }

    async fn shipment_costs(&self, shipment_id: &str) -> SyncResult<ShipmentCosts> {
        let operation = format!("shipment {shipment_id} costs");
        let path = format!("/shipments/{shipment_id}/costs");
        self.policy
            .run(&operation, || self.api.get_json(&operation, &path, &[]))
            .await
    }
}

/// Millisecond RFC 3339, the form the orders search accepts.
fn format_api_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}
