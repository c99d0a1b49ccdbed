use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetops_core::{AggregateId, ExpectedVersion};
use fleetops_events::{Event, EventEnvelope};

/// An event ready to be appended (sequence number not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncommittedEvent(EventEnvelope<JsonValue>);

/// An event persisted in a stream, with its assigned sequence number.
pub type StoredEvent = EventEnvelope<JsonValue>;

impl UncommittedEvent {
    /// Serialize a typed domain event and capture its metadata.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        EventEnvelope::wrap(aggregate_id, aggregate_type, 0, event)
            .map(Self)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.0.aggregate_id()
    }

    pub fn aggregate_type(&self) -> &str {
        self.0.aggregate_type()
    }

    pub(crate) fn commit(self, sequence_number: u64) -> StoredEvent {
        self.0.at_sequence(sequence_number)
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only event store.
///
/// Streams are keyed by aggregate id; sequence numbers start at 1 and have
/// no gaps. `append` is atomic per batch and checks `expected_version`
/// against the current stream version.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Full stream in sequence order; empty if the aggregate does not exist.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }
}
