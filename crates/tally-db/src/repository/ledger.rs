//! # Sales Ledger Repository
//!
//! One immutable row per marketplace order. Full-precision figures from
//! `FinancialBreakdown` are rounded to cents here, and only here.
//!
//! ## Idempotency
//! `insert` uses `ON CONFLICT(order_id) DO NOTHING`, so replaying an order
//! that slipped past the known-id check still leaves exactly one row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::financial::round_pct;
use tally_core::{Money, OrderLine, ShippingClass};

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub order_id: String,
    pub marketplace: String,
    pub ordered_at: DateTime<Utc>,
    pub sku: Option<String>,
    pub quantity: i64,
    pub status: String,
    #[sqlx(rename = "unit_price_cents")]
    pub unit_price: Money,
    #[sqlx(rename = "gross_revenue_cents")]
    pub gross_revenue: Money,
    #[sqlx(rename = "net_revenue_cents")]
    pub net_revenue: Money,
    #[sqlx(rename = "profit_cents")]
    pub profit: Money,
    pub markup_pct: Option<f64>,
    pub margin_pct: Option<f64>,
    pub cost_known: bool,
    pub shipping_code: i64,
    pub shipping_label: String,
}

impl LedgerEntry {
    pub fn shipping_class(&self) -> DbResult<ShippingClass> {
        ShippingClass::from_code(self.shipping_code)
            .map_err(|e| DbError::invalid_data("SalesLedger", &self.order_id, e.to_string()))
    }
}

/// Totals over a window of orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SalesTotals {
    pub orders: i64,
    pub units: i64,
    pub gross_revenue: Money,
    pub net_revenue: Money,
    pub profit: Money,
    /// Orders recorded without a purchase cost.
    pub cost_unknown: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TotalsRow {
    orders: i64,
    units: i64,
    gross_cents: i64,
    net_cents: i64,
    profit_cents: i64,
    cost_unknown: i64,
}

/// Repository for the `sales_ledger` table.
#[derive(Debug, Clone)]
pub struct SalesLedgerRepository {
    pool: SqlitePool,
}

impl SalesLedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SalesLedgerRepository { pool }
    }

    /// Every recorded order id.
    ///
    /// Loaded once per sales cycle so already-known orders skip the
    /// shipment lookup entirely.
    pub async fn order_ids(&self) -> DbResult<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT order_id FROM sales_ledger")
            .fetch_all(&self.pool)
            .await?;

        debug!(count = ids.len(), "Loaded known order ids");
        Ok(ids.into_iter().collect())
    }

    pub async fn contains(&self, order_id: &str) -> DbResult<bool> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sales_ledger WHERE order_id = ?1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found != 0)
    }

    /// Writes one order line.
    ///
    /// ## Returns
    /// * `Ok(true)` - Row inserted
    /// * `Ok(false)` - The order id was already present; nothing changed
    pub async fn insert(&self, line: &OrderLine) -> DbResult<bool> {
        let b = &line.breakdown;

        debug!(
            order_id = %line.order_id,
            sku = ?line.sku,
            class = line.shipping_class.label(),
            "Inserting ledger row"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO sales_ledger (
                order_id, marketplace, ordered_at, sku, quantity, status,
                unit_price_cents, gross_revenue_cents, fees_cents,
                shipping_cost_cents, shipping_deducted_cents, ctl_cents,
                commission_cents, cost_basis_cents, net_revenue_cents,
                tax_cents, profit_cents, markup_pct, margin_pct, cost_known,
                shipping_code, shipping_label, logistic_type, shipment_id,
                synced_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?,
                ?, ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?
            )
            ON CONFLICT(order_id) DO NOTHING
            "#,
        )
        .bind(&line.order_id)
        .bind(&line.marketplace)
        .bind(line.ordered_at)
        .bind(&line.sku)
        .bind(line.quantity)
        .bind(&line.status)
        .bind(Money::from_decimal(line.unit_price))
        .bind(Money::from_decimal(b.gross_revenue))
        .bind(Money::from_decimal(b.fees))
        .bind(Money::from_decimal(line.shipping_cost))
        .bind(Money::from_decimal(b.shipping_deducted))
        .bind(Money::from_decimal(b.ctl))
        .bind(Money::from_decimal(b.commission))
        .bind(Money::from_decimal(b.cost_basis))
        .bind(Money::from_decimal(b.net_revenue))
        .bind(Money::from_decimal(b.tax))
        .bind(Money::from_decimal(b.profit))
        .bind(b.markup_pct.map(round_pct))
        .bind(b.margin_pct.map(round_pct))
        .bind(line.cost_known)
        .bind(line.shipping_class.code())
        .bind(line.shipping_class.label())
        .bind(&line.logistic_type)
        .bind(&line.shipment_id)
        .bind(line.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, order_id: &str) -> DbResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT order_id, marketplace, ordered_at, sku, quantity, status,
                   unit_price_cents, gross_revenue_cents, net_revenue_cents,
                   profit_cents, markup_pct, margin_pct, cost_known,
                   shipping_code, shipping_label
            FROM sales_ledger
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales_ledger")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Totals for orders placed at or after `since`.
    pub async fn totals_since(&self, since: DateTime<Utc>) -> DbResult<SalesTotals> {
        let row: TotalsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS orders,
                COALESCE(SUM(quantity), 0) AS units,
                COALESCE(SUM(gross_revenue_cents), 0) AS gross_cents,
                COALESCE(SUM(net_revenue_cents), 0) AS net_cents,
                COALESCE(SUM(profit_cents), 0) AS profit_cents,
                COALESCE(SUM(CASE WHEN cost_known = 0 THEN 1 ELSE 0 END), 0) AS cost_unknown
            FROM sales_ledger
            WHERE ordered_at >= ?1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(SalesTotals {
            orders: row.orders,
            units: row.units,
            gross_revenue: Money::from_cents(row.gross_cents),
            net_revenue: Money::from_cents(row.net_cents),
            profit: Money::from_cents(row.profit_cents),
            cost_unknown: row.cost_unknown,
        })
    }
}
