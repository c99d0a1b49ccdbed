//! Reference data: items, item groups, units, sites, users and machines.
//!
//! These are flat records owned by the API. The workflow modules only read
//! them (list, select by id); nothing here carries a lifecycle.

pub mod reference;

pub use reference::{Item, ItemGroup, Machine, Reference, Site, Unit, User};
