//! `dealerdesk-pricing` — pure tax & pricing calculation.
//!
//! One formula for the whole back office: orders and invoices both price
//! through [`price`], so their grand totals can never drift apart. No IO, no
//! side effects, checked arithmetic throughout.

pub mod calculator;
pub mod tax;

pub use calculator::{PriceLine, PricingBreakdown, effective_unit_price, price};
pub use tax::TaxRates;
