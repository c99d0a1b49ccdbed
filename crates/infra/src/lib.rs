//! Infrastructure layer: the audit event log, in-memory read models, the
//! command dispatcher and the site stock ledger.
//!
//! Everything here is in-memory and guarded by `RwLock`s; the API service
//! owns one instance of each store for the lifetime of the process.

pub mod command_dispatcher;
pub mod event_store;
pub mod read_model;
pub mod stock;

pub use command_dispatcher::{CommandDispatcher, Decision, DispatchError, Dispatched};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use read_model::{InMemoryStore, KeyValueStore, StoreError};
pub use stock::StockLedger;
