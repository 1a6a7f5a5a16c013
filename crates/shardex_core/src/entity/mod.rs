//! Entity identity and the trait stored types implement.

mod id;

pub use id::EntityId;

/// A record that can be saved through a transaction.
///
/// Entities are identified by a stable [`EntityId`]. Entities stored under
/// ordered indexes also carry a logical position: transactions assign one
/// when it is unset, and scans hand it back through
/// [`Entity::set_position`].
///
/// # Example
///
/// ```rust
/// use shardex_core::{Entity, EntityId};
///
/// struct Post {
///     id: EntityId,
///     position: i64,
/// }
///
/// impl Entity for Post {
///     fn entity_id(&self) -> EntityId {
///         self.id
///     }
///
///     fn position(&self) -> Option<i64> {
///         Some(self.position)
///     }
///
///     fn set_position(&mut self, position: i64) {
///         self.position = position;
///     }
/// }
/// ```
pub trait Entity: 'static {
    /// Returns the entity's stable identifier.
    fn entity_id(&self) -> EntityId;

    /// Returns the logical position, or `None` for entities without one.
    ///
    /// A position `<= 0` counts as unset.
    fn position(&self) -> Option<i64> {
        None
    }

    /// Stores a logical position. Entities without one ignore it.
    fn set_position(&mut self, _position: i64) {}
}
