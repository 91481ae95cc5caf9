//! `dealerdesk-parties` — dealers and tax slabs.
//!
//! Dealers are the approved business customers who place orders. Their
//! running balances are derived state: only settlement and invoicing flows
//! move them, never direct edits.

pub mod dealer;
pub mod tax_slab;

pub use dealer::{
    ApplySettlementTotals, DealerBalances, DeleteDealer, Dealer, DealerCommand, DealerEvent,
    DealerId, DealerStatus, RecordInvoiceExposure, RegisterDealer,
};
pub use tax_slab::{TaxSlab, TaxSlabId, TaxSlabStatus};
