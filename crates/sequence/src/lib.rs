//! `dealerdesk-sequence` — sequential, human-readable identifier minting.
//!
//! SKUs, invoice numbers, packing ids and credit-memo ids all share the same
//! shape: a fixed alphabetic prefix plus a zero-padded numeric suffix
//! (`SKU0001`, `INV0042`). Minting must never hand the same identifier to two
//! concurrent callers, so the allocator does its find-and-increment as a
//! single critical section instead of a read-then-write pair.

pub mod allocator;
pub mod identifier;

pub use allocator::{IdentifierAllocator, MAX_ALLOCATION_ATTEMPTS};
pub use identifier::{IdKind, Identifier};
