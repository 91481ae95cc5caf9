//! `dealerdesk-sales` — the Order aggregate.
//!
//! Orders carry two independent one-way axes: `phase` (the approval gate,
//! Pending → Approved) and `status` (the fulfillment lifecycle). Totals are
//! recomputed through `dealerdesk-pricing` on every line mutation, and an
//! order locks against edits the moment an invoice references it.

pub mod order;

pub use order::{
    ApproveOrder, CreateOrder, MarkInvoiced, NewOrderLine, Order, OrderCommand, OrderEvent,
    OrderId, OrderInvoiceStatus, OrderLine, OrderPhase, OrderStatus, SetStatus, SoftDeleteOrder,
    StockBooking, UpdateLines,
};
