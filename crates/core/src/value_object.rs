//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — `Money`,
/// `Rate`, a tax-rate bundle, an invoice's dealer snapshot. Two value objects
/// with the same attributes are the same value; to "modify" one, construct a
/// new one. This is what makes denormalized snapshots safe: an invoice's
/// embedded dealer and tax-slab copies never change when the master records
/// are later edited.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
