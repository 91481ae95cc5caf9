use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use dealerdesk_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

/// In-memory append-only event store.
///
/// Appends serialize under one write lock, which is what makes
/// `append_batch` all-or-nothing: validation of every stream happens before
/// the first push, and no other writer can interleave.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append_batch(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let batch: Vec<StreamAppend> = batch.into_iter().filter(|s| !s.events.is_empty()).collect();
        if batch.is_empty() {
            return Ok(vec![]);
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Validation pass: nothing is mutated until every entry checks out.
        let mut seen = HashSet::new();
        for entry in &batch {
            let aggregate_id = entry.events[0].aggregate_id;
            let aggregate_type = &entry.events[0].aggregate_type;

            if !seen.insert(aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains two entries for stream {aggregate_id}"
                )));
            }
            for (idx, e) in entry.events.iter().enumerate() {
                if e.aggregate_id != aggregate_id {
                    return Err(EventStoreError::InvalidAppend(format!(
                        "entry mixes aggregate_ids (index {idx})"
                    )));
                }
                if e.aggregate_type != *aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "entry mixes aggregate_types (index {idx})"
                    )));
                }
            }

            let stream = streams.get(&aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);
            if !entry.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {aggregate_id}: expected {:?}, found {current}",
                    entry.expected_version
                )));
            }
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != *aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream {aggregate_id} is '{}', attempted append with '{aggregate_type}'",
                        existing.aggregate_type
                    )));
                }
            }
        }

        // Commit pass: assign sequence numbers and push.
        let mut committed = Vec::new();
        for entry in batch {
            let aggregate_id = entry.events[0].aggregate_id;
            let stream = streams.entry(aggregate_id).or_default();
            let mut next = Self::current_version(stream) + 1;
            for e in entry.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}
