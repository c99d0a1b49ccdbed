//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Reference data (sites, items, units, ...) is keyed by this identifier in
/// the API stores.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Short, human-readable label used in lists and error messages.
    fn label(&self) -> &str;
}
