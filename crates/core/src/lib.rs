//! `fleetops-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod actor;
pub mod aggregate;
pub mod audit;
pub mod entity;
pub mod error;
pub mod id;

pub use actor::Actor;
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use audit::Stamp;
pub use entity::Entity;
pub use error::{DomainError, DomainResult, require_text};
pub use id::{AggregateId, ItemGroupId, ItemId, MachineId, SiteId, UnitId, UserId};
