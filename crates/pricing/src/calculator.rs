//! Line items + dealer discount + tax slab → totals.

use serde::{Deserialize, Serialize};

use dealerdesk_core::{DomainError, DomainResult, Money, Rate, ValueObject};

use crate::tax::TaxRates;

/// Pricing input: one order/invoice line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub quantity: i64,
    /// Undiscounted list price per unit.
    pub list_price: Money,
}

/// Computed totals for a document.
///
/// Invariant: `grand_total = total_before_tax + gst + hst + qst + pst` —
/// always all four components. The upstream system dropped qst/pst from one
/// of its two grand-total formulas; that inconsistency is a defect this
/// calculator exists to prevent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PricingBreakdown {
    pub total_before_tax: Money,
    pub gst: Money,
    pub hst: Money,
    pub qst: Money,
    pub pst: Money,
    pub grand_total: Money,
}

impl PricingBreakdown {
    pub fn tax_total(&self) -> Money {
        // Components were produced by checked arithmetic; their sum fits.
        Money::from_cents(
            self.gst.cents() + self.hst.cents() + self.qst.cents() + self.pst.cents(),
        )
    }
}

impl ValueObject for PricingBreakdown {}

/// Per-unit price after the dealer discount, rounded half-up to the cent.
pub fn effective_unit_price(list_price: Money, discount: Rate) -> DomainResult<Money> {
    if list_price.is_negative() {
        return Err(DomainError::validation("list price cannot be negative"));
    }
    discount.ensure_discount()?;
    list_price.checked_sub(list_price.apply_rate(discount))
}

/// Price a document: discounted lines + transportation, then each tax
/// component on the taxable base, then the full-sum grand total.
pub fn price(
    lines: &[PriceLine],
    discount: Rate,
    slab: &TaxRates,
    transportation: Money,
) -> DomainResult<PricingBreakdown> {
    if lines.is_empty() {
        return Err(DomainError::validation("cannot price a document without lines"));
    }
    if transportation.is_negative() {
        return Err(DomainError::validation("transportation surcharge cannot be negative"));
    }

    let mut total_before_tax = transportation;
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be positive",
                idx + 1
            )));
        }
        let unit = effective_unit_price(line.list_price, discount)?;
        let line_total = unit.checked_mul(line.quantity)?;
        total_before_tax = total_before_tax.checked_add(line_total)?;
    }

    let gst = total_before_tax.apply_rate(slab.gst);
    let hst = total_before_tax.apply_rate(slab.hst);
    let qst = total_before_tax.apply_rate(slab.qst);
    let pst = total_before_tax.apply_rate(slab.pst);

    let grand_total = total_before_tax
        .checked_add(gst)?
        .checked_add(hst)?
        .checked_add(qst)?
        .checked_add(pst)?;

    Ok(PricingBreakdown {
        total_before_tax,
        gst,
        hst,
        qst,
        pst,
        grand_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(quantity: i64, list_cents: i64) -> PriceLine {
        PriceLine {
            quantity,
            list_price: Money::from_cents(list_cents),
        }
    }

    #[test]
    fn two_line_order_with_discount_and_gst_hst() {
        // qty 3 @ $10 + qty 1 @ $50, 10% dealer discount, gst 5% / hst 8%:
        // total before tax 3*$9 + 1*$45 = $72, gst $3.60, hst $5.76,
        // grand total $81.36.
        let slab = TaxRates::new(Rate::percent(5), Rate::percent(8), Rate::ZERO, Rate::ZERO);
        let breakdown = price(
            &[line(3, 1000), line(1, 5000)],
            Rate::percent(10),
            &slab,
            Money::ZERO,
        )
        .unwrap();

        assert_eq!(breakdown.total_before_tax, Money::from_cents(7200));
        assert_eq!(breakdown.gst, Money::from_cents(360));
        assert_eq!(breakdown.hst, Money::from_cents(576));
        assert_eq!(breakdown.qst, Money::ZERO);
        assert_eq!(breakdown.pst, Money::ZERO);
        assert_eq!(breakdown.grand_total, Money::from_cents(8136));
    }

    #[test]
    fn all_four_components_reach_the_grand_total() {
        let slab = TaxRates::new(
            Rate::percent(5),
            Rate::percent(8),
            Rate::from_basis_points(997),
            Rate::percent(7),
        );
        let breakdown = price(&[line(1, 10_000)], Rate::ZERO, &slab, Money::ZERO).unwrap();

        assert_eq!(
            breakdown.grand_total,
            breakdown
                .total_before_tax
                .checked_add(breakdown.tax_total())
                .unwrap()
        );
        // qst and pst are genuinely in the sum, not just stored.
        assert!(breakdown.qst.cents() > 0 && breakdown.pst.cents() > 0);
    }

    #[test]
    fn transportation_is_taxed_with_the_goods() {
        let slab = TaxRates::new(Rate::percent(5), Rate::ZERO, Rate::ZERO, Rate::ZERO);
        let breakdown = price(
            &[line(1, 1000)],
            Rate::ZERO,
            &slab,
            Money::from_cents(500),
        )
        .unwrap();

        assert_eq!(breakdown.total_before_tax, Money::from_cents(1500));
        assert_eq!(breakdown.gst, Money::from_cents(75));
    }

    #[test]
    fn exempt_slab_charges_no_tax() {
        let breakdown = price(
            &[line(2, 2500)],
            Rate::percent(10),
            &TaxRates::exempt(),
            Money::ZERO,
        )
        .unwrap();

        assert_eq!(breakdown.total_before_tax, Money::from_cents(4500));
        assert_eq!(breakdown.grand_total, breakdown.total_before_tax);
        assert!(breakdown.tax_total().is_zero());
    }

    #[test]
    fn rejects_bad_input() {
        let slab = TaxRates::exempt();
        assert!(price(&[], Rate::ZERO, &slab, Money::ZERO).is_err());
        assert!(price(&[line(0, 100)], Rate::ZERO, &slab, Money::ZERO).is_err());
        assert!(price(&[line(1, -100)], Rate::ZERO, &slab, Money::ZERO).is_err());
        assert!(price(&[line(1, 100)], Rate::ZERO, &slab, Money::from_cents(-1)).is_err());
        assert!(price(&[line(1, 100)], Rate::from_basis_points(10_001), &slab, Money::ZERO).is_err());
    }

    proptest! {
        #[test]
        fn grand_total_is_always_the_full_sum(
            qty in 1i64..100,
            list in 0i64..1_000_000,
            discount_bps in 0u32..=10_000,
            gst in 0u32..2_000,
            hst in 0u32..2_000,
            qst in 0u32..2_000,
            pst in 0u32..2_000,
            transport in 0i64..100_000,
        ) {
            let slab = TaxRates::new(
                Rate::from_basis_points(gst),
                Rate::from_basis_points(hst),
                Rate::from_basis_points(qst),
                Rate::from_basis_points(pst),
            );
            let breakdown = price(
                &[line(qty, list)],
                Rate::from_basis_points(discount_bps),
                &slab,
                Money::from_cents(transport),
            ).unwrap();

            prop_assert_eq!(
                breakdown.grand_total.cents(),
                breakdown.total_before_tax.cents()
                    + breakdown.gst.cents()
                    + breakdown.hst.cents()
                    + breakdown.qst.cents()
                    + breakdown.pst.cents()
            );
            // A full discount can zero a line but never make it negative.
            prop_assert!(breakdown.total_before_tax.cents() >= transport);
        }
    }
}
