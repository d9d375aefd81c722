//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Banks, inventory records, requests and history entries are all entities:
/// two values with the same id are the same thing, whatever their other fields.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
