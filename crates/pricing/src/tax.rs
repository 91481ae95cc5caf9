use serde::{Deserialize, Serialize};

use dealerdesk_core::{Rate, ValueObject};

/// Jurisdictional tax rate bundle (GST/HST/QST/PST), in basis points.
///
/// Snapshotted by value into orders and invoices, never referenced live:
/// retiring or editing a tax slab must not change historical documents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaxRates {
    pub gst: Rate,
    pub hst: Rate,
    pub qst: Rate,
    pub pst: Rate,
}

impl TaxRates {
    pub fn new(gst: Rate, hst: Rate, qst: Rate, pst: Rate) -> Self {
        Self { gst, hst, qst, pst }
    }

    /// The all-zero override slab for tax-exempt dealers.
    pub fn exempt() -> Self {
        Self::default()
    }

    pub fn is_exempt(&self) -> bool {
        self.gst.is_zero() && self.hst.is_zero() && self.qst.is_zero() && self.pst.is_zero()
    }
}

impl ValueObject for TaxRates {}
