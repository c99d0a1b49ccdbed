//! Domain events and the envelope they are recorded in.
//!
//! Workflow aggregates emit events; the infrastructure layer wraps them in
//! [`EventEnvelope`]s and appends them to the per-aggregate audit log.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
