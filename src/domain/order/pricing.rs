use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::errors::OrderError;
use super::value_objects::OrderItem;

// ============================================================================
// Order Pricing
// ============================================================================
//
// Totals are computed from live catalog prices at checkout and persisted;
// they are never recomputed afterwards.
//
// ============================================================================

/// 8% sales tax.
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
/// Orders at or above this subtotal ship for free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(100, 0, 0, false, 0);
/// Flat shipping fee below the threshold.
pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(999, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Round half-up to exactly two decimal places.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl OrderTotals {
    /// Compute totals from item snapshots. Amounts too large for a `Decimal`
    /// are rejected rather than wrapped.
    pub fn from_items(items: &[OrderItem]) -> Result<Self, OrderError> {
        let raw = items.iter().try_fold(Decimal::ZERO, |sum, item| {
            item.line_total()
                .and_then(|line| sum.checked_add(line))
                .ok_or(OrderError::AmountOverflow)
        })?;

        let subtotal = round2(raw);
        let tax = round2(subtotal.checked_mul(TAX_RATE).ok_or(OrderError::AmountOverflow)?);
        let shipping = if subtotal >= FREE_SHIPPING_THRESHOLD {
            round2(Decimal::ZERO)
        } else {
            round2(FLAT_SHIPPING)
        };
        let total = subtotal
            .checked_add(tax)
            .and_then(|sum| sum.checked_add(shipping))
            .map(round2)
            .ok_or(OrderError::AmountOverflow)?;

        Ok(Self {
            subtotal,
            tax,
            shipping,
            total,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.total == round2(self.subtotal + self.tax + self.shipping)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
