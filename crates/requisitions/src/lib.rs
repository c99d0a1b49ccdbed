//! Material requisition lifecycle.
//!
//! A site requests materials; an admin forwards the request to a site that
//! holds stock; that site responds (fully or partially), issues, and the
//! requesting site receives. Partial approvals are either forwarded on to a
//! second site or approved for purchase.
//!
//! The whole lifecycle is one explicit state machine ([`transition`]) shared
//! by the API and by client views. Pure domain logic: no IO.

pub mod action;
pub mod error;
pub mod machine;
pub mod model;

pub use action::{Action, ActionKind, Actor, LineResponse, Party};
pub use error::{IllegalReason, TransitionError};
pub use machine::{
    CreateRequisition, RequisitionCommand, RequisitionEvent, Transitioned, TransitionCommand,
    allowed_actions, create, transition,
};
pub use model::{
    HistoryEntry, ItemResponse, MAX_LINE_QUANTITY, NewLine, NewRequisition, Priority, Requisition, RequisitionId,
    RequisitionItem, RequisitionStatus,
};
