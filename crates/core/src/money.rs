//! Monetary amounts and percentage rates.
//!
//! All amounts are integer **cents**; all percentages (dealer discounts, tax
//! rates) are integer **basis points** (100 bps = 1%). Arithmetic is checked
//! and divisions round half-up to the nearest cent, so the same inputs always
//! reconcile to the same totals.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A monetary amount in cents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::conflict("money addition overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::conflict("money subtraction overflow"))
    }

    /// Multiply by a unitless quantity (e.g. line quantity).
    pub fn checked_mul(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::conflict("money multiplication overflow"))
    }

    /// Apply a rate, rounding half-up to the nearest cent.
    ///
    /// A 10% discount on $10.00 is exactly $1.00; a 5% tax on $72.00 is
    /// exactly $3.60. Odd remainders round away from zero.
    pub fn apply_rate(self, rate: Rate) -> Money {
        let product = (self.0 as i128) * (rate.basis_points() as i128);
        let rounded = if product >= 0 {
            (product + 5_000) / 10_000
        } else {
            (product - 5_000) / 10_000
        };
        Money(rounded as i64)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl ValueObject for Money {}

/// A percentage rate in basis points (100 bps = 1%).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    pub const ZERO: Rate = Rate(0);

    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// Whole-percent constructor (`Rate::percent(5)` is 5%).
    pub const fn percent(pct: u32) -> Self {
        Self(pct * 100)
    }

    pub const fn basis_points(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Validate a discount rate: anything above 100% makes prices negative.
    pub fn ensure_discount(&self) -> DomainResult<()> {
        if self.0 > 10_000 {
            return Err(DomainError::validation(format!(
                "discount rate {} bps exceeds 100%",
                self.0
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for Rate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl ValueObject for Rate {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn apply_rate_rounds_half_up() {
        // 5% of $0.10 = 0.5 cents, rounds up to 1 cent.
        assert_eq!(Money::from_cents(10).apply_rate(Rate::percent(5)).cents(), 1);
        // 5% of $72.00 = $3.60 exactly.
        assert_eq!(
            Money::from_cents(7200).apply_rate(Rate::percent(5)).cents(),
            360
        );
        // 10% of $10.00 = $1.00 exactly.
        assert_eq!(
            Money::from_cents(1000).apply_rate(Rate::percent(10)).cents(),
            100
        );
    }

    #[test]
    fn display_formats_dollars_and_cents() {
        assert_eq!(Money::from_cents(8136).to_string(), "$81.36");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Rate::percent(8).to_string(), "8.00%");
    }

    #[test]
    fn discount_above_hundred_percent_is_rejected() {
        assert!(Rate::from_basis_points(10_001).ensure_discount().is_err());
        assert!(Rate::percent(100).ensure_discount().is_ok());
    }

    proptest! {
        #[test]
        fn apply_rate_never_exceeds_rate_ceiling(cents in 0i64..1_000_000_000, bps in 0u32..10_000) {
            let amount = Money::from_cents(cents);
            let taxed = amount.apply_rate(Rate::from_basis_points(bps));
            // Tax on a non-negative amount is non-negative and at most the amount itself.
            prop_assert!(taxed.cents() >= 0);
            prop_assert!(taxed.cents() <= cents);
        }

        #[test]
        fn add_then_sub_round_trips(a in -1_000_000_000i64..1_000_000_000, b in -1_000_000_000i64..1_000_000_000) {
            let sum = Money::from_cents(a).checked_add(Money::from_cents(b)).unwrap();
            let back = sum.checked_sub(Money::from_cents(b)).unwrap();
            prop_assert_eq!(back, Money::from_cents(a));
        }
    }
}
