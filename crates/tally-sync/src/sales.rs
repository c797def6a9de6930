//! # Sales Pipeline
//!
//! Turns marketplace orders into sales ledger rows.
//!
//! ## Per Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  id in ledger snapshot? ── yes ──► already_known                       │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  first order item ─► sku, qty, unit price, fee                         │
//! │  shipment id?  ─► GET /shipments/{id}        → logistic_type → class   │
//! │                ─► GET /shipments/{id}/costs  → sender freight          │
//! │        │   (lookup failure → row error, retried next cycle)            │
//! │        ▼                                                                │
//! │  FinancialPolicy::compute(figures, cost snapshot[sku])                 │
//! │        │                                                                │
//! │  ledger.contains(id)? ── yes ──► already_known                         │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  ledger.insert(line)                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger rows are never updated: a known order id is always skipped.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::marketplace::{OrderPayload, ShipmentSource};
use crate::store::OrderLedger;
use tally_core::financial::{FinancialPolicy, OrderFigures};
use tally_core::validation::{normalize_sku, normalize_status, validate_order_id};
use tally_core::{OrderLine, RowError, SalesSummary, ShippingClass};

// =============================================================================
// Window
// =============================================================================

/// Order creation window for one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SalesWindow {
    /// The calendar month (UTC) containing `now`, up to its last millisecond.
    pub fn current_month(now: DateTime<Utc>) -> Self {
        let from = month_start(now.year(), now.month()).unwrap_or(now);
        let (next_year, next_month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        let to = month_start(next_year, next_month)
            .map(|next| next - Duration::milliseconds(1))
            .unwrap_or(now);
        SalesWindow { from, to }
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

// =============================================================================
// Pipeline
// =============================================================================

/// Shipment-derived facts for one order.
struct ShippingFacts {
    class: ShippingClass,
    logistic_type: Option<String>,
    cost: f64,
}

pub struct SalesPipeline<'a> {
    ledger: &'a dyn OrderLedger,
    shipments: &'a dyn ShipmentSource,
    policy: FinancialPolicy,
    marketplace: String,
}

impl<'a> SalesPipeline<'a> {
    pub fn new(
        ledger: &'a dyn OrderLedger,
        shipments: &'a dyn ShipmentSource,
        policy: FinancialPolicy,
        marketplace: impl Into<String>,
    ) -> Self {
        SalesPipeline {
            ledger,
            shipments,
            policy,
            marketplace: marketplace.into(),
        }
    }

    /// Imports `orders`, pricing each against the `costs` snapshot.
    ///
    /// ## Arguments
    /// * `orders` - Orders fetched for the window
    /// * `costs` - Purchase unit cost per SKU, read once per cycle
    ///
    /// ## Errors
    /// * `SyncError::StoreUnavailable` - The store could not be reached
    /// * `SyncError::Database` - The ledger id query failed
    /// * `SyncError::AuthFailure` - A shipment lookup was refused
    pub async fn import(
        &self,
        orders: &[OrderPayload],
        costs: &HashMap<String, f64>,
    ) -> SyncResult<SalesSummary> {
        let mut known: HashSet<String> = self.ledger.known_ids().await?;

        let mut summary = SalesSummary {
            fetched: orders.len(),
            ..Default::default()
        };

        for order in orders {
            let order_id = order.order_id();

            if let Err(e) = validate_order_id(&order_id) {
                summary.errors.push(RowError::new("<blank order id>", e.to_string()));
                continue;
            }

            if known.contains(&order_id) {
                summary.already_known += 1;
                continue;
            }

            let line = match self.build_line(order, &order_id, costs).await {
                Ok(line) => line,
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Order skipped this cycle");
                    summary.errors.push(RowError::new(&order_id, e.to_string()));
                    continue;
                }
            };

            match self.persist(&line).await {
                Ok(true) => {
                    debug!(
                        order_id = %order_id,
                        class = line.shipping_class.label(),
                        profit = line.breakdown.profit,
                        "Order recorded"
                    );
                    summary.inserted += 1;
                }
                Ok(false) => summary.already_known += 1,
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Order insert failed");
                    summary.errors.push(RowError::new(&order_id, e.to_string()));
                    continue;
                }
            }
            known.insert(order_id);
        }

        info!(
            fetched = summary.fetched,
            already_known = summary.already_known,
            inserted = summary.inserted,
            errors = summary.errors.len(),
            "Sales import finished"
        );

        Ok(summary)
    }

    /// Re-checks the ledger right before inserting.
    ///
    /// Returns `false` when the order turned out to be present already.
    async fn persist(&self, line: &OrderLine) -> SyncResult<bool> {
        if self.ledger.contains(&line.order_id).await? {
            return Ok(false);
        }
        self.ledger.insert(line).await
    }

    async fn build_line(
        &self,
        order: &OrderPayload,
        order_id: &str,
        costs: &HashMap<String, f64>,
    ) -> SyncResult<OrderLine> {
        let item = order
            .first_item()
            .ok_or_else(|| SyncError::Decode(format!("order {order_id} has no items")))?;

        let quantity = item
            .quantity
            .ok_or_else(|| SyncError::Decode(format!("order {order_id} has no quantity")))?;

        let ordered_at = order
            .date_created
            .as_deref()
            .ok_or_else(|| SyncError::Decode(format!("order {order_id} has no creation date")))
            .and_then(|raw| {
                DateTime::parse_from_rfc3339(raw.trim())
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        SyncError::Decode(format!("order {order_id} date {raw:?}: {e}"))
                    })
            })?;

        let sku = normalize_sku(item.item.as_ref().and_then(|i| i.seller_sku.as_deref()));
        let shipment_id = order.shipment_id();
        let shipping = match &shipment_id {
            Some(id) => self.shipping_facts(id).await?,
            None => ShippingFacts {
                class: ShippingClass::Unknown,
                logistic_type: None,
                cost: 0.0,
            },
        };

        let unit_cost = sku.as_ref().and_then(|s| costs.get(s)).copied();
        let unit_price = item.unit_price.unwrap_or(0.0);
        let unit_fee = item.sale_fee.unwrap_or(0.0);

        let breakdown = self.policy.compute(&OrderFigures {
            quantity,
            unit_price,
            unit_fee,
            shipping_cost: shipping.cost,
            shipping_class: shipping.class,
            unit_cost,
        });

        Ok(OrderLine {
            order_id: order_id.to_string(),
            marketplace: self.marketplace.clone(),
            ordered_at,
            sku,
            quantity,
            status: normalize_status(order.status.as_deref()),
            unit_price,
            unit_fee,
            shipping_cost: shipping.cost,
            shipping_class: shipping.class,
            shipment_id,
            logistic_type: shipping.logistic_type,
            breakdown,
            cost_known: unit_cost.is_some(),
            synced_at: Utc::now(),
        })
    }

    async fn shipping_facts(&self, shipment_id: &str) -> SyncResult<ShippingFacts> {
        let detail = self.shipments.shipment(shipment_id).await?;
        let costs = self.shipments.shipment_costs(shipment_id).await?;
        Ok(ShippingFacts {
            class: ShippingClass::from_logistic_type(detail.logistic_type.as_deref()),
            logistic_type: detail.logistic_type,
            cost: costs.sender_cost(),
        })
    }
}
