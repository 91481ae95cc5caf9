//! `dealerdesk-fulfillment` — the PackingSlip aggregate.
//!
//! A packing slip is a warehouse-side snapshot of an approved order: dealer
//! name, PO and lines are copied at draft time so later order edits cannot
//! change what the packer sees. Scanning checks lines off idempotently, and
//! completion requires a signature (and explicit confirmation when lines
//! remain unchecked).

pub mod packing_slip;

pub use packing_slip::{
    CompleteSlip, FinalizeSlip, NewPackingLine, OpenDraft, PackingLine, PackingPhase, PackingSlip,
    PackingSlipCommand, PackingSlipEvent, PackingSlipId, ScanLine,
};
