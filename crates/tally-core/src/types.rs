//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  PERSISTED                           EPHEMERAL (one cycle)             │
//! │  ─────────                           ─────────────────────             │
//! │  ┌─────────────────┐                 ┌─────────────────────┐           │
//! │  │  StockRecord    │ ◄── upsert ──── │  SourceQuantityMap  │           │
//! │  │  sku (key)      │                 │  sku → quantity     │           │
//! │  │  per-source qty │                 └──────────▲──────────┘           │
//! │  │  total          │                            │ aggregate            │
//! │  └─────────────────┘                 ┌──────────┴──────────┐           │
//! │  ┌─────────────────┐                 │  AdItemLinks        │           │
//! │  │  OrderLine      │                 │  sku → [link ids]   │           │
//! │  │  order_id (key) │                 └─────────────────────┘           │
//! │  │  breakdown      │                                                    │
//! │  └─────────────────┘                 ┌─────────────────────┐           │
//! │  ┌─────────────────┐                 │  ReconcileSummary   │           │
//! │  │SyncHistoryEntry │                 │  SalesSummary       │           │
//! │  │  append-only    │                 │  RowError           │           │
//! │  └─────────────────┘                 └─────────────────────┘           │
//! │  ┌─────────────────┐                                                    │
//! │  │  SyncRun        │  one row per cycle stage                          │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage held in basis points (1 bps = 0.01%).
///
/// 741 bps = 7.41% (marketplace commission), 920 bps = 9.2% (sales tax).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// The rate as a fraction (741 bps → 0.0741).
    #[inline]
    pub fn fraction(&self) -> f64 {
        self.0 as f64 / 10_000.0
    }

    /// Applies the rate to a full-precision amount.
    #[inline]
    pub fn apply(&self, amount: f64) -> f64 {
        amount * self.fraction()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Stock Source
// =============================================================================

/// A channel contributing a quantity to a SKU's total.
///
/// The string form is the key inside `StockRecord::source_quantities` and
/// the value of `stock_history.source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum StockSource {
    /// ERP virtual balance.
    Erp,
    /// Units held in the marketplace's own warehouses.
    Fulfillment,
    /// Third channel, maintained by external tooling.
    Marketplace,
}

impl StockSource {
    /// Every source a freshly inserted record is seeded with.
    pub const ALL: [StockSource; 3] = [
        StockSource::Erp,
        StockSource::Fulfillment,
        StockSource::Marketplace,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            StockSource::Erp => "erp",
            StockSource::Fulfillment => "fulfillment",
            StockSource::Marketplace => "marketplace",
        }
    }
}

impl fmt::Display for StockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "erp" => Ok(StockSource::Erp),
            "fulfillment" | "full" => Ok(StockSource::Fulfillment),
            "marketplace" => Ok(StockSource::Marketplace),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

// =============================================================================
// Stock Record
// =============================================================================

/// Per-source quantities keyed by source name.
///
/// Keys are strings rather than `StockSource` so that quantities written by
/// external tooling under a name this build does not know survive a
/// reconciliation round-trip and stay in the total.
pub type SourceQuantities = BTreeMap<String, i64>;

/// The authoritative stock position for one SKU.
///
/// ## Invariant
/// `total == source_quantities.values().sum()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub sku: String,
    pub source_quantities: SourceQuantities,
    pub total: i64,
    /// Maintained by reporting tooling; never written by a sync.
    pub purchase_unit_cost: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Last known quantity for a source. Missing counts as zero.
    pub fn quantity_of(&self, source: StockSource) -> i64 {
        self.source_quantities
            .get(source.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Sum over every source key, known or not.
    pub fn sum_of_sources(&self) -> i64 {
        self.source_quantities.values().sum()
    }

    /// Checks the additivity invariant.
    pub fn check_total(&self) -> CoreResult<()> {
        let computed = self.sum_of_sources();
        if computed != self.total {
            return Err(CoreError::TotalMismatch {
                sku: self.sku.clone(),
                stored: self.total,
                computed,
            });
        }
        Ok(())
    }
}

/// One entry of a product link's stock distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLocation {
    pub location_type: String,
    pub quantity: i64,
}

// =============================================================================
// Per-cycle Aggregates
// =============================================================================

/// SKU → aggregated quantity for one source, built once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuantityMap {
    source: StockSource,
    quantities: BTreeMap<String, i64>,
}

impl SourceQuantityMap {
    pub fn new(source: StockSource) -> Self {
        SourceQuantityMap {
            source,
            quantities: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> StockSource {
        self.source
    }

    /// Overwrites any earlier value for the SKU (last seen wins).
    pub fn set(&mut self, sku: impl Into<String>, quantity: i64) {
        self.quantities.insert(sku.into(), quantity.max(0));
    }

    /// Adds to the SKU's running total.
    pub fn add(&mut self, sku: impl Into<String>, quantity: i64) {
        *self.quantities.entry(sku.into()).or_insert(0) += quantity.max(0);
    }

    pub fn get(&self, sku: &str) -> Option<i64> {
        self.quantities.get(sku).copied()
    }

    pub fn remove(&mut self, sku: &str) -> Option<i64> {
        self.quantities.remove(sku)
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    /// Total units across all SKUs.
    pub fn units(&self) -> i64 {
        self.quantities.values().sum()
    }

    /// Iterates in SKU order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.quantities.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// SKU → ordered, de-duplicated product-link ids.
///
/// One SKU may back several listings; listings that share a product link
/// share its stock, so a link is only kept once per SKU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdItemLinks {
    links: BTreeMap<String, Vec<String>>,
}

impl AdItemLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sku: impl Into<String>, link: impl Into<String>) {
        let link = link.into();
        let entry = self.links.entry(sku.into()).or_default();
        if !entry.contains(&link) {
            entry.push(link);
        }
    }

    pub fn links_for(&self, sku: &str) -> &[String] {
        self.links.get(sku).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sku_count(&self) -> usize {
        self.links.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.links.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

// =============================================================================
// Shipping Class
// =============================================================================

/// How an order leaves the seller, which decides its logistics cost.
///
/// The discriminant is the code persisted in `sales_ledger.shipping_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingClass {
    /// Unrecognised or missing logistic type.
    Unknown = 0,
    /// Shipped from the marketplace's warehouse.
    Fulfillment = 1,
    /// Same-day courier arranged by the seller.
    Flex = 2,
    /// Carrier collection at the seller's address.
    CrossDocking = 3,
}

impl ShippingClass {
    /// Maps the marketplace's `logistic_type` onto a class.
    pub fn from_logistic_type(logistic_type: Option<&str>) -> Self {
        match logistic_type.map(str::trim) {
            Some("fulfillment") => ShippingClass::Fulfillment,
            Some("self_service") => ShippingClass::Flex,
            Some("cross_docking") => ShippingClass::CrossDocking,
            _ => ShippingClass::Unknown,
        }
    }

    pub const fn code(&self) -> i64 {
        *self as i64
    }

    pub fn from_code(code: i64) -> CoreResult<Self> {
        match code {
            0 => Ok(ShippingClass::Unknown),
            1 => Ok(ShippingClass::Fulfillment),
            2 => Ok(ShippingClass::Flex),
            3 => Ok(ShippingClass::CrossDocking),
            other => Err(CoreError::InvalidShippingCode(other)),
        }
    }

    /// Label shown in reports.
    pub const fn label(&self) -> &'static str {
        match self {
            ShippingClass::Unknown => "UNKNOWN",
            ShippingClass::Fulfillment => "FULL",
            ShippingClass::Flex => "FLEX",
            ShippingClass::CrossDocking => "COLETA",
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Full-precision financial figures for one order line.
///
/// Rounded to cents only when written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialBreakdown {
    pub gross_revenue: f64,
    /// Per-unit fee × quantity.
    pub fees: f64,
    /// Logistics cost derived from the shipping class.
    pub ctl: f64,
    pub commission: f64,
    /// Freight actually deducted (zero above the free-shipping threshold).
    pub shipping_deducted: f64,
    pub cost_basis: f64,
    pub net_revenue: f64,
    /// Informational; not subtracted from net revenue.
    pub tax: f64,
    pub profit: f64,
    /// `None` when the unit cost was unknown.
    pub markup_pct: Option<f64>,
    /// `None` when the unit cost was unknown.
    pub margin_pct: Option<f64>,
}

/// One marketplace order as it is written to the sales ledger.
///
/// Immutable once persisted: a known `order_id` is skipped, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: String,
    pub marketplace: String,
    pub ordered_at: DateTime<Utc>,
    /// `None` when the order item carried no seller SKU.
    pub sku: Option<String>,
    pub quantity: i64,
    /// Upper-cased; `UNKNOWN_STATUS` when absent.
    pub status: String,
    pub unit_price: f64,
    pub unit_fee: f64,
    /// Sender freight cost reported by the shipment.
    pub shipping_cost: f64,
    pub shipping_class: ShippingClass,
    pub shipment_id: Option<String>,
    pub logistic_type: Option<String>,
    pub breakdown: FinancialBreakdown,
    pub cost_known: bool,
    pub synced_at: DateTime<Utc>,
}

// =============================================================================
// History
// =============================================================================

/// Append-only snapshot of one SKU's quantity for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncHistoryEntry {
    pub sku: String,
    pub source: StockSource,
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Summaries
// =============================================================================

/// A per-SKU or per-order failure that did not stop the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub key: String,
    pub reason: String,
}

impl RowError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        RowError {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// Outcome of reconciling one `SourceQuantityMap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub source: StockSource,
    pub checked: usize,
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub errors: Vec<RowError>,
}

impl ReconcileSummary {
    pub fn new(source: StockSource) -> Self {
        ReconcileSummary {
            source,
            checked: 0,
            updated: 0,
            inserted: 0,
            unchanged: 0,
            errors: Vec::new(),
        }
    }

    /// Number of write statements issued.
    pub fn writes(&self) -> usize {
        self.updated + self.inserted
    }
}

/// Outcome of one sales import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub fetched: usize,
    pub already_known: usize,
    pub inserted: usize,
    pub errors: Vec<RowError>,
}

// =============================================================================
// Sync Runs
// =============================================================================

/// A stage of the sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Fulfillment,
    Erp,
    Sales,
}

impl SyncStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Fulfillment => "fulfillment",
            SyncStage::Erp => "erp",
            SyncStage::Sales => "sales",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fulfillment" | "stock" => Ok(SyncStage::Fulfillment),
            "erp" => Ok(SyncStage::Erp),
            "sales" => Ok(SyncStage::Sales),
            other => Err(CoreError::UnknownStage(other.to_string())),
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every row written or skipped cleanly.
    Succeeded,
    /// Finished with row failures or truncated input.
    Partial,
    /// Stopped by a stage-level error.
    Failed,
    /// Disabled by configuration.
    Skipped,
}

impl RunOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Partial => "partial",
            RunOutcome::Failed => "failed",
            RunOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the sync run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SyncRun {
    pub id: String,
    pub stage: SyncStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: i64,
    pub updated: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub outcome: RunOutcome,
    pub message: Option<String>,
}
