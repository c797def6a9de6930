//! # SKU Aggregation
//!
//! Turns raw per-listing and per-product records into one quantity per SKU.
//!
//! ## Two Shapes of Source
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FAN-OUT (marketplace fulfillment)                                     │
//! │                                                                         │
//! │  ad MLB1 ─┐                    ┌─► UP-A ─► locations ─► Σ fulfillment  │
//! │  ad MLB2 ─┼─► group_links ─────┤                                  │    │
//! │  ad MLB3 ─┘   (sku → [links])  └─► UP-B ─► locations ─► Σ ──────► +    │
//! │                                                                   │    │
//! │                                          FanOutTally[sku] ◄───────┘    │
//! │                                                                         │
//! │  DIRECT (ERP)                                                          │
//! │                                                                         │
//! │  page 1: {A: 3, B: 1} ─┐                                               │
//! │  page 2: {A: 5}       ─┴─► fold_direct ─► {A: 5, B: 1}  (last wins)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: the caller performs the fetches and feeds the
//! results in.

use std::collections::BTreeSet;

use crate::types::{AdItemLinks, SourceQuantityMap, StockLocation, StockSource};
use crate::validation::normalize_sku;

/// Location types counted as fulfillment stock.
///
/// `meli_facility` is the marketplace's own name for its warehouses.
pub const FULFILLMENT_LOCATION_TYPES: &[&str] = &["fulfillment", "meli_facility"];

// =============================================================================
// Fan-out Path
// =============================================================================

/// What the listing scan learned about one advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdResolution {
    pub item_id: String,
    pub sku: Option<String>,
    pub product_link: Option<String>,
}

/// Links grouped by SKU, plus the listings that could not be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkGrouping {
    pub links: AdItemLinks,
    /// Item ids of listings missing a SKU or a product link.
    pub dropped: Vec<String>,
}

/// Groups product links by trimmed SKU.
///
/// Listings without a usable SKU or link are dropped, not treated as errors.
pub fn group_links<I>(ads: I) -> LinkGrouping
where
    I: IntoIterator<Item = AdResolution>,
{
    let mut grouping = LinkGrouping::default();

    for ad in ads {
        let sku = normalize_sku(ad.sku.as_deref());
        let link = ad
            .product_link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        match (sku, link) {
            (Some(sku), Some(link)) => grouping.links.push(sku, link),
            _ => grouping.dropped.push(ad.item_id),
        }
    }

    grouping
}

/// Sums the quantities held at fulfillment locations.
///
/// Negative quantities reported by the API are treated as zero.
pub fn fulfillment_units(locations: &[StockLocation]) -> i64 {
    locations
        .iter()
        .filter(|loc| FULFILLMENT_LOCATION_TYPES.contains(&loc.location_type.as_str()))
        .map(|loc| loc.quantity.max(0))
        .sum()
}

/// Accumulates per-link stock into per-SKU totals.
///
/// A SKU with any failed stock lookup on one of its known links is
/// excluded from the result. Only links that were resolved count: a
/// listing whose detail lookup failed never reaches the tally, so its
/// SKU is summed from the listings that did resolve and the caller
/// reports the scan as incomplete.
#[derive(Debug, Clone)]
pub struct FanOutTally {
    quantities: SourceQuantityMap,
    failed: BTreeSet<String>,
}

/// Result of a fan-out pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutResult {
    pub quantities: SourceQuantityMap,
    /// SKUs left out because a lookup failed.
    pub excluded: Vec<String>,
}

impl FanOutTally {
    pub fn new(source: StockSource) -> Self {
        FanOutTally {
            quantities: SourceQuantityMap::new(source),
            failed: BTreeSet::new(),
        }
    }

    /// Adds one link's units to the SKU.
    pub fn record(&mut self, sku: &str, units: i64) {
        self.quantities.add(sku, units);
    }

    /// Marks the SKU as incomplete for this cycle.
    pub fn fail(&mut self, sku: &str) {
        self.failed.insert(sku.to_string());
    }

    pub fn finish(mut self) -> FanOutResult {
        for sku in &self.failed {
            self.quantities.remove(sku);
        }
        FanOutResult {
            quantities: self.quantities,
            excluded: self.failed.into_iter().collect(),
        }
    }
}

// =============================================================================
// Direct Path
// =============================================================================

/// One product row from a direct source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectEntry {
    pub sku: Option<String>,
    /// `None` when the source reported no balance at all.
    pub quantity: Option<i64>,
}

/// Result of folding direct pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectFold {
    pub quantities: SourceQuantityMap,
    /// Rows without a usable SKU.
    pub missing_sku: usize,
    /// SKUs whose rows carried no balance.
    pub missing_quantity: Vec<String>,
}

/// Folds product rows into SKU → quantity, last seen wins.
///
/// A row with no balance is skipped rather than read as zero, so a SKU
/// whose later row lacks a balance keeps the value from an earlier row.
pub fn fold_direct<I>(source: StockSource, entries: I) -> DirectFold
where
    I: IntoIterator<Item = DirectEntry>,
{
    let mut fold = DirectFold {
        quantities: SourceQuantityMap::new(source),
        missing_sku: 0,
        missing_quantity: Vec::new(),
    };

    for entry in entries {
        let Some(sku) = normalize_sku(entry.sku.as_deref()) else {
            fold.missing_sku += 1;
            continue;
        };
        match entry.quantity {
            Some(quantity) => fold.quantities.set(sku, quantity),
            None => fold.missing_quantity.push(sku),
        }
    }

    fold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(item: &str, sku: Option<&str>, link: Option<&str>) -> AdResolution {
        AdResolution {
            item_id: item.to_string(),
            sku: sku.map(str::to_string),
            product_link: link.map(str::to_string),
        }
    }

    fn loc(kind: &str, quantity: i64) -> StockLocation {
        StockLocation {
            location_type: kind.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_group_links_drops_incomplete_ads() {
        let grouping = group_links(vec![
            ad("MLB1", Some(" CAP-001 "), Some("UP-A")),
            ad("MLB2", Some("CAP-001"), Some("UP-B")),
            ad("MLB3", None, Some("UP-C")),
            ad("MLB4", Some("CAP-002"), None),
            ad("MLB5", Some("  "), Some("UP-D")),
        ]);

        assert_eq!(grouping.links.sku_count(), 1);
        assert_eq!(
            grouping.links.links_for("CAP-001"),
            ["UP-A".to_string(), "UP-B".to_string()]
        );
        assert_eq!(grouping.dropped, vec!["MLB3", "MLB4", "MLB5"]);
    }

    #[test]
    fn test_fulfillment_units_filters_location_type() {
        let locations = vec![
            loc("meli_facility", 4),
            loc("selling_address", 10),
            loc("fulfillment", 2),
            loc("meli_facility", -3),
        ];
        assert_eq!(fulfillment_units(&locations), 6);
        assert_eq!(fulfillment_units(&[]), 0);
    }

    #[test]
    fn test_fan_out_tally_sums_links_and_excludes_failures() {
        let mut tally = FanOutTally::new(StockSource::Fulfillment);
        tally.record("CAP-001", 4);
        tally.record("CAP-001", 3);
        tally.record("CAP-002", 5);
        tally.fail("CAP-002");
        tally.record("CAP-003", 0);

        let result = tally.finish();
        assert_eq!(result.quantities.get("CAP-001"), Some(7));
        assert_eq!(result.quantities.get("CAP-002"), None);
        assert_eq!(result.quantities.get("CAP-003"), Some(0));
        assert_eq!(result.excluded, vec!["CAP-002"]);
    }

    #[test]
    fn test_fold_direct_last_seen_wins() {
        let entry = |sku: Option<&str>, quantity: Option<i64>| DirectEntry {
            sku: sku.map(str::to_string),
            quantity,
        };

        let fold = fold_direct(
            StockSource::Erp,
            vec![
                entry(Some("A"), Some(3)),
                entry(Some("B"), Some(1)),
                entry(Some(" A "), Some(5)),
                entry(None, Some(9)),
                entry(Some("B"), None),
                entry(Some("C"), None),
            ],
        );

        assert_eq!(fold.quantities.get("A"), Some(5));
        assert_eq!(fold.quantities.get("B"), Some(1));
        assert_eq!(fold.quantities.get("C"), None);
        assert_eq!(fold.missing_sku, 1);
        assert_eq!(fold.missing_quantity, vec!["B", "C"]);
    }
}
