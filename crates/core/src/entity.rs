//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing revision of the persisted row.
    ///
    /// Immutable entities (ledger rows) stay at their first revision.
    fn version(&self) -> u64 {
        1
    }
}
