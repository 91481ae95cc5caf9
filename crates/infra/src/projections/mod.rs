//! Read-model projections.
//!
//! Projections consume committed event envelopes and build query-optimized
//! state. They are rebuildable from the stream and idempotent under
//! at-least-once delivery (the per-stream sequence number is the dedup key).

pub mod dealer_statement;

pub use dealer_statement::{DealerStatement, DealerStatementProjection, ProjectionError};
