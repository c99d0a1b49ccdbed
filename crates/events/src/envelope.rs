use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetops_core::AggregateId;

use crate::Event;

/// Envelope for an event, containing stream metadata.
///
/// This is the unit appended to an aggregate's audit log.
///
/// - **Append-only**: `sequence_number` increases by one per event in a stream.
/// - `payload` is the serialized domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Position in the aggregate stream, starting at 1.
    sequence_number: u64,

    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// The same envelope placed at another stream position.
    ///
    /// Stores assign positions on append; callers wrap with 0.
    pub fn at_sequence(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Wrap a domain event, serializing its payload to JSON.
    pub fn wrap<T>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event: &T,
    ) -> Result<Self, serde_json::Error>
    where
        T: Event + Serialize,
    {
        Ok(Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_event_metadata() {
        let at = Utc::now();
        let agg = AggregateId::new();
        let env = EventEnvelope::wrap(agg, "test.aggregate", 3, &Pinged { at }).unwrap();

        assert_eq!(env.aggregate_id(), agg);
        assert_eq!(env.aggregate_type(), "test.aggregate");
        assert_eq!(env.sequence_number(), 3);
        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.event_version(), 2);
        assert_eq!(env.occurred_at(), at);
        assert!(env.payload().get("at").is_some());

        let moved = env.clone().at_sequence(9);
        assert_eq!(moved.sequence_number(), 9);
        assert_eq!(moved.event_id(), env.event_id());
    }
}
