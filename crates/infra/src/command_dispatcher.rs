//! Command execution pipeline.
//!
//! The dispatcher orchestrates the event-sourcing lifecycle for a single
//! aggregate: load history, rehydrate, decide, persist with an optimistic
//! version check, publish. Orchestration services reuse the same building
//! blocks (`load`, `stage`, `commit`) to decide several aggregates against
//! loaded state and commit them through one `append_batch`, so cross-aggregate
//! flows are still all-or-nothing.
//!
//! Events are persisted before publication; if publishing fails the events
//! are already durable, so retrying publication gives at-least-once delivery
//! and consumers must be idempotent.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use dealerdesk_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use dealerdesk_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The aggregate rejected the command.
    #[error(transparent)]
    Domain(DomainError),

    /// Failed to deserialize historical payloads into the aggregate's event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),

    /// Persisting to the event store failed.
    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (retry may duplicate).
    #[error("event publication failed after append: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        DispatchError::Domain(value)
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests can run fully in memory and a
/// persistent backend can slot in without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate, returning it with its stream version.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, u64), DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let version = stream_version(&history);

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok((aggregate, version))
    }

    /// Serialize decided events into one stream's slice of an atomic batch.
    pub fn stage<A>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        current_version: u64,
        events: &[A::Event],
    ) -> Result<StreamAppend, DispatchError>
    where
        A: Aggregate,
        A::Event: dealerdesk_events::Event + Serialize,
    {
        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StreamAppend {
            expected_version: ExpectedVersion::Exact(current_version),
            events: uncommitted,
        })
    }

    /// Commit a batch (all streams or none) and publish every stored event.
    pub fn commit(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.store.append_batch(batch)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch a command against one aggregate: load, decide, persist,
    /// publish. A decided-empty command is a recognized no-op and commits
    /// nothing.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: dealerdesk_events::Event + Serialize + DeserializeOwned,
    {
        let (aggregate, version) = self.load(aggregate_id, make_aggregate)?;

        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let staged = Self::stage::<A>(aggregate_id, aggregate_type, version, &decided)?;
        self.commit(vec![staged])
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Defense in depth: a correct backend already guarantees this.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
