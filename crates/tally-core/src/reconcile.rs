//! # Upsert Decisions
//!
//! Decides, per SKU, whether a freshly aggregated quantity inserts a new
//! stock record, updates an existing one, or changes nothing.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────────┬──────────────────────────┬───────────────────────────┐
//! │ stored record    │ stored qty for source    │ decision                  │
//! ├──────────────────┼──────────────────────────┼───────────────────────────┤
//! │ none             │ -                        │ Insert (others = 0)       │
//! │ present          │ == new qty               │ Unchanged (no write)      │
//! │ present          │ != new qty (missing = 0) │ Update, total = Σ sources │
//! └──────────────────┴──────────────────────────┴───────────────────────────┘
//! ```
//!
//! The total is always recomputed from the per-source map, so a record
//! whose stored total had drifted is repaired by its next update.

use chrono::{DateTime, Utc};

use crate::types::{SourceQuantities, StockRecord, StockSource};

/// What the engine should do for one SKU.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertDecision {
    /// Create the record.
    Insert(StockRecord),
    /// Replace the record's quantities.
    Update {
        sku: String,
        source_quantities: SourceQuantities,
        total: i64,
        /// The source's quantity before this cycle.
        previous: i64,
    },
    /// This source's quantity is already current.
    Unchanged,
}

/// Builds a new record: every known source at zero, then `source` set.
pub fn new_record(
    sku: &str,
    source: StockSource,
    quantity: i64,
    now: DateTime<Utc>,
) -> StockRecord {
    let mut source_quantities: SourceQuantities = StockSource::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    source_quantities.insert(source.as_str().to_string(), quantity);

    let total = source_quantities.values().sum();
    StockRecord {
        sku: sku.to_string(),
        source_quantities,
        total,
        purchase_unit_cost: None,
        created_at: now,
        updated_at: now,
    }
}

/// Decides how `quantity` for `source` lands on `existing`.
pub fn decide(
    existing: Option<&StockRecord>,
    sku: &str,
    source: StockSource,
    quantity: i64,
    now: DateTime<Utc>,
) -> UpsertDecision {
    let quantity = quantity.max(0);

    let Some(record) = existing else {
        return UpsertDecision::Insert(new_record(sku, source, quantity, now));
    };

    let previous = record.quantity_of(source);
    if previous == quantity {
        return UpsertDecision::Unchanged;
    }

    let mut source_quantities = record.source_quantities.clone();
    source_quantities.insert(source.as_str().to_string(), quantity);
    let total = source_quantities.values().sum();

    UpsertDecision::Update {
        sku: record.sku.clone(),
        source_quantities,
        total,
        previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    fn stored(quantities: &[(&str, i64)]) -> StockRecord {
        let now = Utc::now();
        let source_quantities: SourceQuantities = quantities
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        StockRecord {
            sku: "CAP-001".to_string(),
            total: source_quantities.values().sum(),
            source_quantities,
            purchase_unit_cost: Some(Money::from_cents(1000)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_seeds_every_known_source() {
        let decision = decide(None, "CAP-001", StockSource::Fulfillment, 7, Utc::now());

        let UpsertDecision::Insert(record) = decision else {
            panic!("expected insert, got {decision:?}");
        };
        assert_eq!(record.total, 7);
        assert_eq!(record.quantity_of(StockSource::Fulfillment), 7);
        assert_eq!(record.quantity_of(StockSource::Erp), 0);
        assert!(record.source_quantities.contains_key("marketplace"));
        assert!(record.check_total().is_ok());
    }

    #[test]
    fn test_unchanged_when_source_quantity_matches() {
        let rec = stored(&[("erp", 5), ("fulfillment", 3), ("marketplace", 1)]);
        assert_eq!(
            decide(Some(&rec), "CAP-001", StockSource::Erp, 5, Utc::now()),
            UpsertDecision::Unchanged
        );
    }

    #[test]
    fn test_update_recomputes_total_from_other_sources() {
        let rec = stored(&[("erp", 5), ("fulfillment", 3), ("marketplace", 1)]);
        let decision = decide(Some(&rec), "CAP-001", StockSource::Fulfillment, 10, Utc::now());

        match decision {
            UpsertDecision::Update {
                total,
                previous,
                source_quantities,
                ..
            } => {
                assert_eq!(total, 16);
                assert_eq!(previous, 3);
                assert_eq!(source_quantities["erp"], 5);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_source_counts_as_zero() {
        // Record written before the fulfillment source existed
        let rec = stored(&[("erp", 5), ("legacy", 2)]);

        assert_eq!(
            decide(Some(&rec), "CAP-001", StockSource::Fulfillment, 0, Utc::now()),
            UpsertDecision::Unchanged
        );

        match decide(Some(&rec), "CAP-001", StockSource::Fulfillment, 4, Utc::now()) {
            UpsertDecision::Update { total, previous, .. } => {
                assert_eq!(previous, 0);
                assert_eq!(total, 11);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_update_repairs_drifted_total() {
        let mut rec = stored(&[("erp", 5), ("fulfillment", 3)]);
        rec.total = 99;

        match decide(Some(&rec), "CAP-001", StockSource::Erp, 6, Utc::now()) {
            UpsertDecision::Update { total, .. } => assert_eq!(total, 9),
            other => panic!("expected update, got {other:?}"),
        }
    }
}
