//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Malformed input values                         │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tally-sync errors (separate crate)                                    │
//! │  └── SyncError        - Fetch, auth and cycle failures                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError/SyncError → exit code     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored record names a source this build does not know how to parse.
    #[error("Unknown stock source: {0}")]
    UnknownSource(String),

    /// A stage name outside `fulfillment`, `erp`, `sales`.
    #[error("Unknown sync stage: {0}")]
    UnknownStage(String),

    /// A stock record whose total disagrees with its per-source quantities.
    ///
    /// ## When This Occurs
    /// - A row was edited by hand outside the reconciliation engine
    /// - A source column was added without recomputing totals
    #[error("Stock total mismatch for {sku}: stored {stored}, sum of sources {computed}")]
    TotalMismatch {
        sku: String,
        stored: i64,
        computed: i64,
    },

    /// A persisted shipping class code outside the known set.
    #[error("Invalid shipping class code: {0}")]
    InvalidShippingCode(i64),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} must not be negative, got {value}")]
    Negative { field: String, value: i64 },

    /// Invalid format (e.g. unparseable amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
