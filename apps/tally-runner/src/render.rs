//! Text, CSV and JSON renderings of stock records.
//!
//! Columns are the union of source keys across the records being shown,
//! so every quantity that counts toward `total` is visible.

use std::collections::BTreeSet;

use anyhow::Context;

use tally_core::StockRecord;

const TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Sorted union of source keys across `records`.
pub fn source_columns(records: &[StockRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.source_quantities.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Fixed-width table: SKU, one column per source, total.
pub fn stock_table(records: &[StockRecord]) -> String {
    let columns = source_columns(records);

    let mut out = format!("{:<40}", "SKU");
    for column in &columns {
        out.push_str(&format!(" {column:>12}"));
    }
    out.push_str(&format!(" {:>8}\n", "total"));

    for record in records {
        out.push_str(&format!("{:<40}", record.sku));
        for column in &columns {
            let quantity = record.source_quantities.get(column).copied().unwrap_or(0);
            out.push_str(&format!(" {quantity:>12}"));
        }
        out.push_str(&format!(" {:>8}\n", record.total));
    }
    out
}

/// Everything stored for one SKU.
pub fn stock_detail(record: &StockRecord) -> String {
    let mut out = format!("SKU:         {}\n", record.sku);
    for (source, quantity) in &record.source_quantities {
        out.push_str(&format!("  {source:<12} {quantity:>8}\n"));
    }
    out.push_str(&format!("Total:       {}\n", record.total));
    match record.purchase_unit_cost {
        Some(cost) => out.push_str(&format!("Unit cost:   {cost}\n")),
        None => out.push_str("Unit cost:   not set\n"),
    }
    out.push_str(&format!("Created:     {}\n", record.created_at.format(TIMESTAMP)));
    out.push_str(&format!("Updated:     {}\n", record.updated_at.format(TIMESTAMP)));
    out
}

/// CSV with a header row: sku, one column per source, total, unit cost,
/// updated_at (RFC 3339).
pub fn stock_csv(records: &[StockRecord]) -> anyhow::Result<String> {
    let columns = source_columns(records);
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["sku".to_string()];
    header.extend(columns.iter().cloned());
    header.extend(["total", "purchase_unit_cost", "updated_at"].map(String::from));
    wtr.write_record(&header)?;

    for record in records {
        let mut row = vec![record.sku.clone()];
        row.extend(columns.iter().map(|column| {
            record
                .source_quantities
                .get(column)
                .copied()
                .unwrap_or(0)
                .to_string()
        }));
        row.push(record.total.to_string());
        row.push(
            record
                .purchase_unit_cost
                .map(|cost| cost.to_string())
                .unwrap_or_default(),
        );
        row.push(record.updated_at.to_rfc3339());
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Pretty JSON array of the records.
pub fn stock_json(records: &[StockRecord]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
