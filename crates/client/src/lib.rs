//! Client-side layer for the FleetOps back office.
//!
//! - `api`: typed HTTP bindings for the FleetOps API
//! - `cache`: the single client-side query cache
//! - `notify`: toast notifications
//! - `view` / `workflow`: requisition screens and the action runner
//! - `session`: the persisted auth slice

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod view;
pub mod workflow;

pub use api::ApiClient;
pub use backend::RequisitionBackend;
pub use cache::QueryCache;
pub use config::ClientConfig;
pub use error::ClientError;
pub use notify::{MemoryNotifier, Notifier, Severity, Toast, TracingNotifier};
pub use session::{Session, SessionError, SessionStore};
pub use view::{ActionButton, LineView, RequisitionView};
pub use workflow::{WorkflowError, WorkflowService};
