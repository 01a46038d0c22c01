//! Fixed-point numerics.
//!
//! Prices are counted in integer **ticks** and quantities in integer **lots**.
//! Matching arithmetic never touches floating point, so conservation checks
//! are exact. Conversion to human units goes through [`rust_decimal`] with the
//! symbol's tick / lot size.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A price in integer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Price(pub u64);

impl Price {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Human-readable price given the symbol's tick size.
    #[must_use]
    pub fn to_decimal(self, tick_size: Decimal) -> Decimal {
        Decimal::from(self.0) * tick_size
    }

    /// Relative deviation `|self - reference| / reference` as a fraction.
    ///
    /// Returns `None` for a zero reference.
    #[must_use]
    pub fn deviation_from(self, reference: Price) -> Option<Decimal> {
        if reference.is_zero() {
            return None;
        }
        let diff = self.0.abs_diff(reference.0);
        Some(Decimal::from(diff) / Decimal::from(reference.0))
    }

    /// Whether the price sits on the given tick increment.
    #[must_use]
    pub const fn is_multiple_of(self, increment: u64) -> bool {
        increment == 0 || self.0 % increment == 0
    }

    /// Notional value of `qty` at this price (ticks × lots).
    #[must_use]
    pub fn notional(self, qty: Quantity) -> Notional {
        Notional(u128::from(self.0) * u128::from(qty.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// A quantity in integer lots. Never negative by construction; subtraction
/// is checked so an underflow surfaces as an invariant violation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Quantity(pub u64);

impl Quantity {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(lots: u64) -> Self {
        Self(lots)
    }

    #[must_use]
    pub const fn lots(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Human-readable quantity given the symbol's lot size.
    #[must_use]
    pub fn to_decimal(self, lot_size: Decimal) -> Decimal {
        Decimal::from(self.0) * lot_size
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Notional
// ---------------------------------------------------------------------------

/// Price × quantity in ticks × lots. Account balances use the same unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Notional(pub u128);

impl Notional {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Notional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
