//! Entity identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Width of an encoded entity id.
pub const ENTITY_ID_LEN: usize = 16;

/// Identifier of an entity, stored under the id field tag of every index
/// record so scans can tell revisions of one entity apart.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an entity ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ENTITY_ID_LEN]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creates an entity ID from an integer. Handy for deterministic ids.
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ENTITY_ID_LEN] {
        self.0.as_bytes()
    }

    /// Returns the UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Reads an entity ID back from a stored record.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        Uuid::from_slice(slice).ok().map(Self)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn from_u128_is_big_endian() {
        let id = EntityId::from_u128(1);
        assert_eq!(id.as_bytes()[15], 1);
        assert!(id.as_bytes()[..15].iter().all(|b| *b == 0));
    }

    #[test]
    fn from_slice_requires_16_bytes() {
        assert!(EntityId::from_slice(&[0u8; 16]).is_some());
        assert!(EntityId::from_slice(&[0u8; 15]).is_none());
        assert!(EntityId::from_slice(&[0u8; 17]).is_none());
    }

    #[test]
    fn serializes_as_uuid_string() {
        let id = EntityId::from_u128(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
