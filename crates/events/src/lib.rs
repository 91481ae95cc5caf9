//! `dealerdesk-events` — event mechanics shared by all domain crates.
//!
//! Contains the [`Event`] trait, the persisted/published [`EventEnvelope`],
//! the pub/sub [`EventBus`] abstraction (with an in-memory implementation for
//! tests and development), the [`Projection`] read-model trait, and the
//! fire-and-forget [`AuditSink`].

pub mod audit;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;

pub use audit::{AuditRecord, AuditSink, NullAuditSink, TracingAuditSink};
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{BusPoisoned, InMemoryEventBus};
pub use projection::Projection;
