use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections transform events (write model) into queryable state (read
/// model). Read models are disposable: they can be deleted and rebuilt from
/// events at any time, which is why they must be **idempotent** — applying
/// the same envelope twice must produce the same state (the envelope's
/// sequence number is the usual dedup key).
///
/// Persistence of the read model is an infrastructure concern; this trait is
/// a pure event consumer.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
