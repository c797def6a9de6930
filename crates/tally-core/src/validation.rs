//! # Validation Module
//!
//! Normalisation and validation of values arriving from external payloads.
//!
//! ## Where This Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: serde payload structs (tally-sync)                           │
//! │  └── Optional fields, nothing trusted yet                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Trim SKUs, reject empty ones                                      │
//! │  └── Upper-case statuses, default missing ones                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite (tally-db)                                            │
//! │  ├── PRIMARY KEY on stock.sku / sales_ledger.order_id                  │
//! │  └── CHECK (quantity >= 0)                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_SKU_LENGTH, UNKNOWN_STATUS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// SKU
// =============================================================================

/// Trims a raw SKU. Empty or absent SKUs come back as `None`.
///
/// ## Example
/// ```rust
/// use tally_core::validation::normalize_sku;
///
/// assert_eq!(normalize_sku(Some("  CAP-001 ")), Some("CAP-001".to_string()));
/// assert_eq!(normalize_sku(Some("   ")), None);
/// assert_eq!(normalize_sku(None), None);
/// ```
pub fn normalize_sku(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validates a SKU typed by an operator.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_SKU_LENGTH` characters
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.chars().count() > MAX_SKU_LENGTH {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Quantities & Orders
// =============================================================================

/// Validates a stock quantity before it is persisted.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 0 {
        return Err(ValidationError::Negative {
            field: "quantity".to_string(),
            value: quantity,
        });
    }
    Ok(())
}

/// Validates an order id before it becomes a ledger key.
pub fn validate_order_id(order_id: &str) -> ValidationResult<()> {
    if order_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "order_id".to_string(),
        });
    }
    Ok(())
}

/// Upper-cases an order status, substituting `UNKNOWN_STATUS` when absent.
pub fn normalize_status(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(status) => status.to_uppercase(),
        None => UNKNOWN_STATUS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("CAP-001").is_ok());
        assert!(validate_sku("  ").is_err());
        assert!(matches!(
            validate_sku(&"X".repeat(MAX_SKU_LENGTH + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(0).is_ok());
        assert!(validate_quantity(12).is_ok());
        assert!(validate_quantity(-1).is_err());
    }

    #[test]
    fn test_validate_order_id() {
        assert!(validate_order_id("2000001234").is_ok());
        assert!(validate_order_id("").is_err());
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(Some("paid")), "PAID");
        assert_eq!(normalize_status(Some(" cancelled ")), "CANCELLED");
        assert_eq!(normalize_status(Some("")), UNKNOWN_STATUS);
        assert_eq!(normalize_status(None), UNKNOWN_STATUS);
    }
}
