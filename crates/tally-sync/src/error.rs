//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Fetch       │  │     Cycle-fatal         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RateLimited    │  │  AuthFailure            │ │
//! │  │  ConfigLoad     │  │  FetchExhausted │  │  StoreUnavailable       │ │
//! │  │  InvalidUrl     │  │  Transport      │  │                         │ │
//! │  │                 │  │  Decode         │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  Per row        │  Accumulated into summaries, never propagated      │
//! │  │  RowWriteFailure│  past the engine that produced them.               │
//! │  │  Database       │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handling
//! - `RateLimited` is the only retryable error; `RetryPolicy` consumes it.
//! - `FetchExhausted` ends one fetch; the cycle continues with partial data.
//! - `AuthFailure` and `StoreUnavailable` abort the whole cycle.
//! - `Transport` and `Decode` end the stage they occurred in.

use thiserror::Error;

use tally_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure of a cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read or parsed.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// A configured URL does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Fetch Errors
    // =========================================================================
    /// The remote API answered HTTP 429.
    #[error("Rate limited during {operation}")]
    RateLimited { operation: String },

    /// Rate limiting persisted past the retry budget.
    #[error("{operation} still rate limited after {attempts} attempts")]
    FetchExhausted { operation: String, attempts: u32 },

    /// Token acquisition failed, or the API rejected the token.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Connection, timeout or unexpected HTTP status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// A single SKU or order could not be written.
    #[error("Failed to write {key}: {reason}")]
    RowWriteFailure { key: String, reason: String },

    /// A statement failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The store could not be reached at all.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        if err.is_unavailable() {
            SyncError::StoreUnavailable(err.to_string())
        } else {
            SyncError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the same request may be retried after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RateLimited { .. })
    }

    /// Returns true if the whole cycle must stop.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::AuthFailure(_)
                | SyncError::StoreUnavailable(_)
                | SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
        )
    }
}
