//! # Order Financials
//!
//! Computes revenue, cost, tax and margin for one marketplace order line.
//!
//! ## Formula
//! ```text
//! gross        = unit_price × qty
//! fees         = unit_fee × qty
//! ctl          = FULL: rate_per_unit × qty │ FLEX: flat │ COLETA: flat │ else 0
//! commission   = gross × commission_rate
//! shipping     = sender_cost  if gross < free_shipping_threshold, else 0
//! net          = gross − fees − ctl − commission − shipping
//! tax          = gross × tax_rate                  (reported, not deducted)
//! cost_basis   = unit_cost × qty                   (0 when unknown)
//! profit       = net − cost_basis
//! markup %     = profit × 100 / cost_basis         (0 when cost_basis = 0)
//! margin %     = profit × 100 / gross              (0 when gross = 0)
//! ```
//!
//! All figures stay in full precision; rounding happens once, when the
//! ledger row is written.

use serde::{Deserialize, Serialize};

use crate::types::{FinancialBreakdown, Rate, ShippingClass};

/// Pricing parameters applied to every order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialPolicy {
    /// Per-unit logistics cost for fulfillment orders.
    pub fulfillment_rate_per_unit: f64,
    /// Flat logistics cost for flex orders.
    pub flex_flat_cost: f64,
    /// Flat logistics cost for collection orders.
    pub cross_docking_flat_cost: f64,
    pub commission_rate: Rate,
    pub tax_rate: Rate,
    /// Below this gross amount the seller pays the freight.
    pub free_shipping_threshold: f64,
}

impl Default for FinancialPolicy {
    fn default() -> Self {
        FinancialPolicy {
            fulfillment_rate_per_unit: 1.2,
            flex_flat_cost: 6.0,
            cross_docking_flat_cost: 6.0,
            commission_rate: Rate::from_bps(741),
            tax_rate: Rate::from_bps(920),
            free_shipping_threshold: 79.0,
        }
    }
}

/// Raw inputs for one order line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderFigures {
    pub quantity: i64,
    pub unit_price: f64,
    pub unit_fee: f64,
    pub shipping_cost: f64,
    pub shipping_class: ShippingClass,
    /// `None` when no purchase cost is on record for the SKU.
    pub unit_cost: Option<f64>,
}

impl FinancialPolicy {
    /// Logistics cost for the class and quantity.
    pub fn logistics_cost(&self, class: ShippingClass, quantity: i64) -> f64 {
        match class {
            ShippingClass::Fulfillment => self.fulfillment_rate_per_unit * quantity as f64,
            ShippingClass::Flex => self.flex_flat_cost,
            ShippingClass::CrossDocking => self.cross_docking_flat_cost,
            ShippingClass::Unknown => 0.0,
        }
    }

    /// Computes the full breakdown for one order line.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::financial::{FinancialPolicy, OrderFigures};
    /// use tally_core::ShippingClass;
    ///
    /// let breakdown = FinancialPolicy::default().compute(&OrderFigures {
    ///     quantity: 2,
    ///     unit_price: 50.0,
    ///     unit_fee: 5.0,
    ///     shipping_cost: 20.0,
    ///     shipping_class: ShippingClass::Fulfillment,
    ///     unit_cost: Some(10.0),
    /// });
    /// assert!((breakdown.net_revenue - 80.19).abs() < 1e-9);
    /// ```
    pub fn compute(&self, order: &OrderFigures) -> FinancialBreakdown {
        let qty = order.quantity as f64;

        let gross_revenue = order.unit_price * qty;
        let fees = order.unit_fee * qty;
        let ctl = self.logistics_cost(order.shipping_class, order.quantity);
        let commission = self.commission_rate.apply(gross_revenue);
        let shipping_deducted = if gross_revenue < self.free_shipping_threshold {
            order.shipping_cost
        } else {
            0.0
        };

        let net_revenue = gross_revenue - fees - ctl - commission - shipping_deducted;
        let tax = self.tax_rate.apply(gross_revenue);

        let cost_basis = order.unit_cost.unwrap_or(0.0) * qty;
        let profit = net_revenue - cost_basis;

        let (markup_pct, margin_pct) = match order.unit_cost {
            Some(_) => (
                Some(if cost_basis > 0.0 {
                    profit * 100.0 / cost_basis
                } else {
                    0.0
                }),
                Some(if gross_revenue > 0.0 {
                    profit * 100.0 / gross_revenue
                } else {
                    0.0
                }),
            ),
            None => (None, None),
        };

        FinancialBreakdown {
            gross_revenue,
            fees,
            ctl,
            commission,
            shipping_deducted,
            cost_basis,
            net_revenue,
            tax,
            profit,
            markup_pct,
            margin_pct,
        }
    }
}

/// Rounds a percentage to two places for storage.
pub fn round_pct(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    fn figures(class: ShippingClass, unit_cost: Option<f64>) -> OrderFigures {
        OrderFigures {
            quantity: 2,
            unit_price: 50.0,
            unit_fee: 5.0,
            shipping_cost: 20.0,
            shipping_class: class,
            unit_cost,
        }
    }

    #[test]
    fn test_reference_order() {
        let b = FinancialPolicy::default().compute(&figures(ShippingClass::Fulfillment, Some(10.0)));

        assert_eq!(Money::from_decimal(b.gross_revenue).cents(), 10000);
        assert_eq!(Money::from_decimal(b.ctl).cents(), 240);
        assert_eq!(Money::from_decimal(b.commission).cents(), 741);
        assert_eq!(b.shipping_deducted, 0.0);
        assert_eq!(Money::from_decimal(b.net_revenue).cents(), 8019);
        assert_eq!(Money::from_decimal(b.cost_basis).cents(), 2000);
        assert_eq!(Money::from_decimal(b.profit).cents(), 6019);
        assert_eq!(Money::from_decimal(b.tax).cents(), 920);
        assert_eq!(b.margin_pct.map(round_pct), Some(60.19));
        assert_eq!(b.markup_pct.map(round_pct), Some(300.95));
    }

    #[test]
    fn test_freight_deducted_below_threshold() {
        let policy = FinancialPolicy::default();
        let mut order = figures(ShippingClass::Flex, Some(10.0));
        order.quantity = 1;
        order.unit_price = 40.0;

        let b = policy.compute(&order);
        // 40 - 5 - 6 - 2.964 - 20
        assert_eq!(b.shipping_deducted, 20.0);
        assert_eq!(Money::from_decimal(b.net_revenue).cents(), 604);
    }

    #[test]
    fn test_logistics_cost_by_class() {
        let policy = FinancialPolicy::default();
        assert!((policy.logistics_cost(ShippingClass::Fulfillment, 3) - 3.6).abs() < 1e-9);
        assert_eq!(policy.logistics_cost(ShippingClass::Flex, 3), 6.0);
        assert_eq!(policy.logistics_cost(ShippingClass::CrossDocking, 3), 6.0);
        assert_eq!(policy.logistics_cost(ShippingClass::Unknown, 3), 0.0);
    }

    #[test]
    fn test_unknown_cost_leaves_ratios_empty() {
        let b = FinancialPolicy::default().compute(&figures(ShippingClass::Fulfillment, None));

        assert_eq!(b.cost_basis, 0.0);
        assert_eq!(Money::from_decimal(b.profit).cents(), 8019);
        assert_eq!(b.markup_pct, None);
        assert_eq!(b.margin_pct, None);
    }

    #[test]
    fn test_zero_cost_and_zero_gross() {
        let policy = FinancialPolicy::default();

        let b = policy.compute(&figures(ShippingClass::Unknown, Some(0.0)));
        assert_eq!(b.markup_pct, Some(0.0));

        let mut free = figures(ShippingClass::Unknown, Some(0.0));
        free.unit_price = 0.0;
        let b = policy.compute(&free);
        assert_eq!(b.margin_pct, Some(0.0));
    }
}
