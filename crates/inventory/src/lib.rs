//! `dealerdesk-inventory` — per-location stock rows.
//!
//! Each row tracks one `(product, child SKU, location)` key with on-hand,
//! booked and damaged counters. Availability is always `quantity - booked`;
//! the stock status is derived from that figure on read and never stored.

pub mod stock_row;

pub use stock_row::{
    BookStock, FulfillShipment, RecordDamage, ReceiveStock, ReleaseBooking, StockKey, StockRow,
    StockRowCommand, StockRowEvent, StockRowId, StockStatus, StockThresholds,
};
