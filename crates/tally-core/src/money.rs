//! # Money Module
//!
//! Provides the `Money` type used for every persisted monetary value.
//!
//! ## Where Floats Stop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Marketplace payloads ──► f64 prices, fees, freight                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  financial::FinancialPolicy::compute  (full precision, f64)            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Money::from_decimal  ← the ONLY float boundary, rounds to cents       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  sales_ledger / stock.purchase_unit_cost_cents (INTEGER)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Intermediate figures are never rounded, so a ledger row always equals the
//! formula applied to the raw inputs, rounded once.
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let net = Money::from_decimal(80.189_999_9);
//! assert_eq!(net.cents(), 8019);
//! assert_eq!(net.to_string(), "80.19");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed: a loss-making order has a negative profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a full-precision decimal amount into cents.
    ///
    /// Rounds half away from zero (`0.125 → 0.13`, `-0.125 → -0.13`).
    /// Non-finite input maps to zero.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_decimal(60.19).cents(), 6019);
    /// assert_eq!(Money::from_decimal(-0.125).cents(), -13);
    /// ```
    pub fn from_decimal(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money::zero();
        }
        Money((amount * 100.0).round() as i64)
    }

    /// Parses a user-supplied amount such as `"12.5"` or `"12,50"`.
    ///
    /// Used by the `set-cost` command; the comma form is what the ERP
    /// exports.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().replace(',', ".");
        let amount: f64 = normalized
            .parse()
            .map_err(|_| ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: format!("'{}' is not a decimal number", input.trim()),
            })?;
        if !amount.is_finite() {
            return Err(ValidationError::InvalidFormat {
                field: "amount".to_string(),
                reason: "amount must be finite".to_string(),
            });
        }
        if amount < 0.0 {
            return Err(ValidationError::Negative {
                field: "amount".to_string(),
                value: (amount * 100.0).round() as i64,
            });
        }
        Ok(Money::from_decimal(amount))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as a decimal, for feeding back into float math.
    #[inline]
    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal with two places, no currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
