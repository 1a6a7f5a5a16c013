//! Core type definitions for shardex.

use crate::entity::EntityId;
use std::fmt;
use uuid::Uuid;

/// Width of the scope segment at the front of every key.
pub const SCOPE_LEN: usize = 16;

/// Width of the position segment of ordered keys.
pub const POSITION_LEN: usize = 8;

/// Maximum index bytes kept in unordered keys.
pub const INDEX_LEN: usize = 16;

/// Maximum index bytes kept in ordered keys.
pub const ORDERED_INDEX_LEN: usize = 8;

/// Ordering mode of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Order {
    /// Point lookups only.
    #[default]
    None,
    /// Scans return lower positions first.
    Ascending,
    /// Scans return higher positions first.
    Descending,
}

impl Order {
    /// Returns `true` for ascending and descending indexes.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Name used in index and column names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Ascending => "Ascending",
            Self::Descending => "Descending",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The partition key of a transaction.
///
/// Every key written by a transaction starts with the first [`SCOPE_LEN`]
/// bytes of its scope, zero-padded when shorter. Scopes that only differ
/// after byte 16 address the same records.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKey(Vec<u8>);

impl ScopeKey {
    /// Creates a scope from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the fixed-width segment used in keys.
    #[must_use]
    pub fn segment(&self) -> [u8; SCOPE_LEN] {
        crate::key::scope_segment(&self.0)
    }
}

impl fmt::Debug for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeKey({self})")
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match <[u8; 16]>::try_from(self.0.as_slice()) {
            Ok(bytes) => write!(f, "{}", Uuid::from_bytes(bytes)),
            Err(_) => {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<Uuid> for ScopeKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes().to_vec())
    }
}

impl From<EntityId> for ScopeKey {
    fn from(id: EntityId) -> Self {
        Self(id.as_bytes().to_vec())
    }
}

impl From<&str> for ScopeKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for ScopeKey {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&[u8]> for ScopeKey {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Vec<u8>> for ScopeKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<[u8; 16]> for ScopeKey {
    fn from(value: [u8; 16]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&ScopeKey> for ScopeKey {
    fn from(value: &ScopeKey) -> Self {
        value.clone()
    }
}

/// Logical position helpers.
pub mod positions {
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Converts a wall-clock time to a position: 100 ns ticks since the Unix
    /// epoch. Times before the epoch map to 0.
    #[must_use]
    pub fn from_system_time(time: SystemTime) -> i64 {
        time.duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_nanos() / 100).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Position of the current wall-clock time.
    #[must_use]
    pub fn now() -> i64 {
        from_system_time(SystemTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn order_names() {
        assert_eq!(Order::None.to_string(), "None");
        assert_eq!(Order::Descending.name(), "Descending");
        assert!(Order::Ascending.is_ordered());
        assert!(!Order::None.is_ordered());
    }

    #[test]
    fn scope_display_uses_uuid_for_16_bytes() {
        let uuid = Uuid::new_v4();
        assert_eq!(ScopeKey::from(uuid).to_string(), uuid.to_string());
        assert_eq!(ScopeKey::from(&[0xab, 0x01][..]).to_string(), "ab01");
    }

    #[test]
    fn scope_segment_pads_and_truncates() {
        let short = ScopeKey::from("ab");
        let mut expected = [0u8; SCOPE_LEN];
        expected[..2].copy_from_slice(b"ab");
        assert_eq!(short.segment(), expected);

        let long = ScopeKey::from("0123456789abcdefXYZ");
        assert_eq!(&long.segment(), b"0123456789abcdef");
    }

    #[test]
    fn positions_from_system_time() {
        let time = UNIX_EPOCH + Duration::from_secs(1);
        assert_eq!(positions::from_system_time(time), 10_000_000);
        assert_eq!(positions::from_system_time(UNIX_EPOCH), 0);
        assert!(positions::now() > positions::from_system_time(SystemTime::UNIX_EPOCH));
    }
}
