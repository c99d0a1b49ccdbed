//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream from the event store
//!   ↓
//! 2. Rehydrate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append with an exact expected version
//! ```
//!
//! The dispatcher never touches read models; callers project the returned
//! aggregate into whatever store serves their queries.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use fleetops_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use fleetops_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The stream moved between load and append.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// The aggregate refused the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A historical payload no longer matches the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    /// State after the new events were applied.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    /// The appended envelopes, with their sequence numbers.
    pub committed: Vec<StoredEvent>,
}

/// Events decided against a known stream version, not yet appended.
#[derive(Debug, Clone)]
pub struct Decision<A: Aggregate> {
    aggregate_id: AggregateId,
    aggregate_type: String,
    expected: ExpectedVersion,
    /// State the events would produce.
    pub aggregate: A,
    pub events: Vec<A::Event>,
}

/// Reusable command execution engine.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load, rehydrate, decide and append.
    ///
    /// A command that decides no events is not an error: the current state is
    /// returned and nothing is appended.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate + Clone,
        A::Error: Into<DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let decision = self.decide(aggregate_id, aggregate_type, command, make_aggregate)?;
        self.commit(decision)
    }

    /// Load, rehydrate and decide without appending.
    ///
    /// Callers with side effects outside the log stage them from the decided
    /// events, then [`commit`](Self::commit).
    pub fn decide<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Decision<A>, DispatchError>
    where
        A: Aggregate + Clone,
        A::Error: Into<DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let (aggregate, events) = aggregate
            .execute(&command)
            .map_err(|e| DispatchError::Domain(e.into()))?;

        Ok(Decision {
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            expected,
            aggregate,
            events,
        })
    }

    /// Append a decision's events with the version it was decided against.
    pub fn commit<A>(&self, decision: Decision<A>) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: Event + Serialize,
    {
        let Decision {
            aggregate_id,
            aggregate_type,
            expected,
            aggregate,
            events,
        } = decision;
        if events.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events,
                committed: vec![],
            });
        }

        let uncommitted = events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, &aggregate_type, ev))
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(uncommitted, expected)?;

        tracing::debug!(
            %aggregate_id,
            aggregate_type = aggregate_type.as_str(),
            appended = committed.len(),
            version = stream_version(&committed),
            "events appended"
        );

        Ok(Dispatched {
            aggregate,
            events,
            committed,
        })
    }

    /// Rebuild an aggregate from its stream; `None` if it has no events.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Option<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(Some(aggregate))
    }

    pub fn history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, DispatchError> {
        Ok(self.store.load_stream(aggregate_id)?)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number()).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id() != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number() <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number()
            ))));
        }
        last = e.sequence_number();
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload().clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use chrono::Utc;
    use fleetops_core::{Actor, AggregateRoot, ItemId, SiteId, UnitId, UserId};
    use fleetops_requisitions::{
        Action, CreateRequisition, NewLine, NewRequisition, Priority, Requisition,
        RequisitionCommand, RequisitionId, RequisitionStatus, TransitionCommand,
    };

    const TYPE: &str = "requisitions.requisition";

    fn create_command(id: RequisitionId, site: SiteId) -> RequisitionCommand {
        RequisitionCommand::Create(CreateRequisition {
            id,
            new: NewRequisition {
                requisition_no: "REQ-1".into(),
                requesting_site: site,
                priority: Priority::High,
                items: vec![NewLine {
                    item_id: ItemId::new(),
                    unit_id: UnitId::new(),
                    quantity: 3,
                }],
                notes: None,
            },
            prepared_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn forward(to_site: SiteId) -> RequisitionCommand {
        RequisitionCommand::Transition(TransitionCommand {
            action: Action::Forward {
                to_site,
                notes: None,
            },
            actor: Actor::admin(UserId::new()),
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> Requisition {
        Requisition::empty(RequisitionId::new(id))
    }

    #[test]
    fn dispatch_appends_and_rehydrates() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = RequisitionId::generate();
        let site = SiteId::new();

        let created = dispatcher
            .dispatch(id.0, TYPE, create_command(id, site), make)
            .unwrap();
        assert_eq!(created.committed.len(), 1);
        assert_eq!(created.aggregate.status(), RequisitionStatus::Pending);

        let forwarded = dispatcher
            .dispatch(id.0, TYPE, forward(SiteId::new()), make)
            .unwrap();
        assert_eq!(forwarded.committed[0].sequence_number(), 2);
        assert_eq!(forwarded.aggregate.status(), RequisitionStatus::Forwarded);
        assert_eq!(forwarded.aggregate.version(), 2);

        let loaded = dispatcher.load(id.0, make).unwrap().unwrap();
        assert_eq!(loaded, forwarded.aggregate);
        assert_eq!(dispatcher.history(id.0).unwrap().len(), 2);
    }

    #[test]
    fn refused_commands_append_nothing() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = RequisitionId::generate();
        let site = SiteId::new();
        dispatcher
            .dispatch(id.0, TYPE, create_command(id, site), make)
            .unwrap();

        // Forwarding to the requesting site is a validation failure.
        let err = dispatcher
            .dispatch(id.0, TYPE, forward(site), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Validation(_))));
        assert_eq!(dispatcher.history(id.0).unwrap().len(), 1);
    }

    #[test]
    fn decisions_append_nothing_until_committed() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = RequisitionId::generate();
        dispatcher
            .dispatch(id.0, TYPE, create_command(id, SiteId::new()), make)
            .unwrap();

        let decision = dispatcher
            .decide(id.0, TYPE, forward(SiteId::new()), make)
            .unwrap();
        assert_eq!(decision.aggregate.status(), RequisitionStatus::Forwarded);
        assert_eq!(dispatcher.history(id.0).unwrap().len(), 1);

        let committed = dispatcher.commit(decision).unwrap();
        assert_eq!(committed.committed[0].sequence_number(), 2);
        assert_eq!(dispatcher.history(id.0).unwrap().len(), 2);
    }

    #[test]
    fn stale_decisions_fail_to_commit() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = RequisitionId::generate();
        dispatcher
            .dispatch(id.0, TYPE, create_command(id, SiteId::new()), make)
            .unwrap();

        let stale = dispatcher
            .decide(id.0, TYPE, forward(SiteId::new()), make)
            .unwrap();
        dispatcher
            .dispatch(id.0, TYPE, forward(SiteId::new()), make)
            .unwrap();

        let err = dispatcher.commit(stale).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        assert_eq!(dispatcher.history(id.0).unwrap().len(), 2);
    }

    #[test]
    fn transitions_on_unknown_streams_are_not_found() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let id = RequisitionId::generate();
        let err = dispatcher
            .dispatch(id.0, TYPE, forward(SiteId::new()), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::NotFound)));
        assert!(dispatcher.load(id.0, make).unwrap().is_none());
    }
}
