//! `dealerdesk-invoicing` — the Invoice aggregate.
//!
//! An invoice consolidates one or more approved orders under a single INV
//! number, snapshots the dealer and tax slab at issue time, and tracks
//! `paid` / `due` so that `paid + due == grand_total` at every version.
//! Estimates share the document shape but never accept payments.

pub mod invoice;

pub use invoice::{
    ApplyPayment, DealerSnapshot, EditInvoiceLines, Invoice, InvoiceCommand, InvoiceDocId,
    InvoiceEvent, InvoiceIssued, InvoiceKind, InvoiceLine, InvoiceLinesEdited, InvoiceStatus,
    IssueInvoice, NewInvoiceLine, PaymentApplied,
};
