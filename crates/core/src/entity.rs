//! Entity trait: records with an identity that survives state changes.

/// Entity marker + minimal interface.
///
/// Two entities are "the same" when their ids match, even if every other
/// field differs (a user whose role was just changed is still that user).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
