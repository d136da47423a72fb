//! Entity trait: identity + storage kind for durable records.

/// A durable record addressed by a stable identifier.
///
/// `KIND` names the entity group in the datastore (e.g. `"Job"`); together with
/// `storage_key()` it forms the datastore key.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Datastore kind for this entity type.
    const KIND: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// String form of the identifier used as the datastore key name.
    fn storage_key(&self) -> String {
        self.id().to_string()
    }
}
