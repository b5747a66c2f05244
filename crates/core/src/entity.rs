//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stores key documents by `Entity::Id`, so the id must be cheap to clone and
/// hashable.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
