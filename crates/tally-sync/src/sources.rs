//! # Source Scans
//!
//! Drives the fetches for one stock source and feeds the results through
//! the pure aggregation in `tally_core::aggregate`.
//!
//! ## Fulfillment (fan-out)
//! ```text
//! item ids (paged) ─► item detail ─► (sku, user_product_id) ─► group_links
//!                                                                   │
//!         FanOutTally ◄── fulfillment_units ◄── user-product stock ◄┘
//! ```
//!
//! ## ERP (direct)
//! ```text
//! products (paged, loop-checked) ─► fold_direct ─► SKU → quantity
//! ```
//!
//! Lookup failures on a single item or link become row errors; anything
//! cycle-fatal (auth, store) is returned.

use tracing::{debug, info, warn};

use crate::erp::ErpClient;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::StopReason;
use crate::marketplace::MarketplaceClient;
use tally_core::aggregate::{fold_direct, fulfillment_units, group_links, AdResolution, FanOutTally};
use tally_core::{RowError, SourceQuantityMap, StockSource};

/// Fulfillment quantities gathered in one cycle.
#[derive(Debug, Clone)]
pub struct FulfillmentScan {
    pub quantities: SourceQuantityMap,
    pub items_seen: usize,
    /// Listings without a SKU or product link.
    pub dropped: Vec<String>,
    /// SKUs left out because one of their link lookups failed.
    pub excluded: Vec<String>,
    pub errors: Vec<RowError>,
    pub stop: StopReason,
}

impl FulfillmentScan {
    /// True when every listing was read and every lookup succeeded.
    pub fn is_complete(&self) -> bool {
        self.stop.is_complete() && self.errors.is_empty()
    }
}

/// ERP quantities gathered in one cycle.
#[derive(Debug, Clone)]
pub struct ErpScan {
    pub quantities: SourceQuantityMap,
    pub products_seen: usize,
    pub missing_sku: usize,
    /// SKUs whose rows carried no balance.
    pub missing_quantity: Vec<String>,
    pub stop: StopReason,
}

impl ErpScan {
    pub fn is_complete(&self) -> bool {
        self.stop.is_complete() && self.missing_quantity.is_empty()
    }
}

/// Turns a lookup failure into a row reason, or returns it when it must
/// end the cycle.
fn row_reason(err: SyncError) -> SyncResult<String> {
    if err.is_cycle_fatal() {
        Err(err)
    } else {
        Ok(err.to_string())
    }
}

/// Reads fulfillment stock for every listing of the seller.
///
/// ## Errors
/// * `SyncError::AuthFailure` - Token rejected
/// * `SyncError::Transport` / `Decode` - The listing search itself failed
pub async fn scan_fulfillment(
    client: &MarketplaceClient,
    page_size: u32,
) -> SyncResult<FulfillmentScan> {
    let listing = client.item_ids(page_size).await?;
    let items_seen = listing.items.len();
    let mut errors = Vec::new();

    info!(items = items_seen, pages = listing.pages, "Listing scan finished");

    let mut resolutions = Vec::with_capacity(items_seen);
    for item_id in listing.items {
        match client.item_detail(&item_id).await {
            Ok(detail) => resolutions.push(AdResolution {
                sku: detail.seller_sku().map(str::to_string),
                product_link: detail.user_product_id,
                item_id,
            }),
            Err(e) => {
                let reason = row_reason(e)?;
                warn!(item_id = %item_id, reason = %reason, "Item detail lookup failed");
                errors.push(RowError::new(item_id, reason));
            }
        }
    }

    let grouping = group_links(resolutions);
    if !grouping.dropped.is_empty() {
        debug!(dropped = grouping.dropped.len(), "Listings without SKU or product link");
    }

    let mut tally = FanOutTally::new(StockSource::Fulfillment);
    for (sku, links) in grouping.links.iter() {
        for link in links {
            match client.user_product_stock(link).await {
                Ok(locations) => tally.record(sku, fulfillment_units(&locations)),
                Err(e) => {
                    let reason = row_reason(e)?;
                    warn!(sku = %sku, link = %link, reason = %reason, "Stock lookup failed");
                    errors.push(RowError::new(sku, format!("{link}: {reason}")));
                    tally.fail(sku);
                }
            }
        }
    }

    let result = tally.finish();
    info!(
        skus = result.quantities.len(),
        units = result.quantities.units(),
        excluded = result.excluded.len(),
        "Fulfillment aggregation finished"
    );

    Ok(FulfillmentScan {
        quantities: result.quantities,
        items_seen,
        dropped: grouping.dropped,
        excluded: result.excluded,
        errors,
        stop: listing.stop,
    })
}

/// Reads every ERP product and folds it into SKU quantities.
pub async fn scan_erp(client: &ErpClient, page_size: u32) -> SyncResult<ErpScan> {
    let products = client.products(page_size).await?;
    let products_seen = products.items.len();

    let fold = fold_direct(
        StockSource::Erp,
        products.items.iter().map(|p| p.to_entry()),
    );

    if !fold.missing_quantity.is_empty() {
        warn!(
            skus = fold.missing_quantity.len(),
            "ERP products without a stock balance skipped"
        );
    }

    info!(
        products = products_seen,
        skus = fold.quantities.len(),
        units = fold.quantities.units(),
        stop = %products.stop,
        "ERP aggregation finished"
    );

    Ok(ErpScan {
        quantities: fold.quantities,
        products_seen,
        missing_sku: fold.missing_sku,
        missing_quantity: fold.missing_quantity,
        stop: products.stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_reason_passes_fatal_errors_through() {
        assert!(row_reason(SyncError::AuthFailure("401".into())).is_err());
        assert!(row_reason(SyncError::StoreUnavailable("closed".into())).is_err());

        let reason = row_reason(SyncError::Transport("item MLB1: HTTP 500: oops".into())).unwrap();
        assert!(reason.contains("MLB1"));
    }

    #[test]
    fn test_scan_completeness() {
        let scan = ErpScan {
            quantities: SourceQuantityMap::new(StockSource::Erp),
            products_seen: 0,
            missing_sku: 2,
            missing_quantity: Vec::new(),
            stop: StopReason::LoopDetected,
        };
        assert!(scan.is_complete());

        let truncated = ErpScan {
            stop: StopReason::RetryBudgetExhausted("erp products".into()),
            ..scan
        };
        assert!(!truncated.is_complete());
    }
}
