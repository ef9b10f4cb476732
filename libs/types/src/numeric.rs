//! Fixed-point decimal prices and whole-unit quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Quantities are whole units: every unit is a distinct physical object, so
//! there is no fractional quantity anywhere in the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A strictly positive limit or execution price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Returns None unless `value > 0`.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// # Panics
    /// Panics if `value` is zero.
    pub fn from_u64(value: u64) -> Self {
        Self::try_new(Decimal::from(value)).expect("Price must be positive")
    }

    /// Parse a decimal string; rejects zero, negatives and garbage.
    pub fn from_str(s: &str) -> Option<Self> {
        Decimal::from_str(s).ok().and_then(Self::try_new)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Exact `price × quantity`, or None when the product cannot be
    /// represented without rounding.
    pub fn notional(&self, quantity: Quantity) -> Option<Decimal> {
        let units = quantity.get();
        let product = self.0.checked_mul(Decimal::from(units))?;
        // checked_mul rescales instead of failing once the mantissa is full
        let dropped = self.0.scale().checked_sub(product.scale())?;
        let exact = self.0.mantissa().checked_mul(i128::from(units))?;
        let rebuilt = 10i128.checked_pow(dropped)?.checked_mul(product.mantissa())?;
        (rebuilt == exact).then_some(product)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Count of whole asset units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(units: u64) -> Self {
        Self(units)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Remove one unit.
    ///
    /// # Panics
    /// Panics if the quantity is already zero
    pub fn decrement(&mut self) {
        assert!(self.0 > 0, "Quantity underflow");
        self.0 -= 1;
    }

    pub fn increment(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
