//! Byte-key codec.
//!
//! Every record key has the layout
//!
//! ```text
//! scope(16) [‖ position(8)] ‖ index bytes(≤16, or ≤8 after a position) ‖ tag(1)
//! ```
//!
//! The scope is truncated or zero-padded to 16 bytes. Index bytes are
//! truncated, so two entities whose index bytes share the kept prefix
//! collide and the later write wins. All tags of one entity revision share
//! the key prefix, so they sort next to each other.

use crate::error::{CoreError, CoreResult};
use crate::types::{Order, INDEX_LEN, ORDERED_INDEX_LEN, POSITION_LEN, SCOPE_LEN};

/// Byte appended to a key prefix to tell the records of one revision apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FieldTag {
    /// The entity id.
    EntityId = 0,
    /// The encoded body, on value-holding indexes.
    Body = 1,
    /// The value-index key prefix, on pointer indexes.
    Pointer = 2,
    /// The logical position, on the value index.
    Position = 3,
}

impl FieldTag {
    /// Every tag, in key order.
    pub const ALL: [Self; 4] = [Self::EntityId, Self::Body, Self::Pointer, Self::Position];

    /// Returns the tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parses a tag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::EntityId),
            1 => Some(Self::Body),
            2 => Some(Self::Pointer),
            3 => Some(Self::Position),
            _ => None,
        }
    }
}

/// Truncates or zero-pads a scope to [`SCOPE_LEN`] bytes.
#[must_use]
pub fn scope_segment(scope: &[u8]) -> [u8; SCOPE_LEN] {
    let mut segment = [0u8; SCOPE_LEN];
    let len = scope.len().min(SCOPE_LEN);
    segment[..len].copy_from_slice(&scope[..len]);
    segment
}

/// Encodes a position so keys sort in scan order.
///
/// Descending positions are stored as `i64::MAX - position`, which keeps
/// higher positions first for every position `>= 0`.
#[must_use]
pub fn encode_position(order: Order, position: i64) -> [u8; POSITION_LEN] {
    match order {
        Order::Descending => (i64::MAX - position).to_be_bytes(),
        Order::None | Order::Ascending => position.to_be_bytes(),
    }
}

/// Decodes a position written by [`encode_position`].
#[must_use]
pub fn decode_position(order: Order, bytes: &[u8]) -> Option<i64> {
    let raw = i64::from_be_bytes(bytes.get(..POSITION_LEN)?.try_into().ok()?);
    Some(match order {
        Order::Descending => i64::MAX - raw,
        Order::None | Order::Ascending => raw,
    })
}

/// Builds the key prefix shared by every record of one entity revision.
///
/// # Errors
///
/// Returns a usage error when `order` is ordered and `position` is missing
/// or not strictly positive.
pub fn make_key(
    scope: &[u8],
    order: Order,
    position: Option<i64>,
    index_bytes: &[u8],
) -> CoreResult<Vec<u8>> {
    let mut key = Vec::with_capacity(SCOPE_LEN + POSITION_LEN + INDEX_LEN + 1);
    key.extend_from_slice(&scope_segment(scope));
    let index_len = if order.is_ordered() {
        let position = match position {
            Some(position) if position > 0 => position,
            other => {
                return Err(CoreError::usage(format!(
                    "{order} keys need a position greater than 0, got {other:?}"
                )))
            }
        };
        key.extend_from_slice(&encode_position(order, position));
        ORDERED_INDEX_LEN
    } else {
        INDEX_LEN
    };
    key.extend_from_slice(&index_bytes[..index_bytes.len().min(index_len)]);
    Ok(key)
}

/// Appends a field tag to a key prefix.
#[must_use]
pub fn with_tag(prefix: &[u8], tag: FieldTag) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1);
    key.extend_from_slice(prefix);
    key.push(tag.as_byte());
    key
}

/// Splits a record key into its prefix and tag byte.
#[must_use]
pub fn split_tag(key: &[u8]) -> Option<(&[u8], u8)> {
    let (tag, prefix) = key.split_last()?;
    Some((prefix, *tag))
}

/// Reads the position segment of an ordered key.
#[must_use]
pub fn position_segment(key: &[u8], order: Order) -> Option<i64> {
    if !order.is_ordered() {
        return None;
    }
    decode_position(order, key.get(SCOPE_LEN..SCOPE_LEN + POSITION_LEN)?)
}

/// The range `[prefix, prefix ‖ 4)` covering every tag of one revision.
#[must_use]
pub fn tag_range(prefix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut end = prefix.to_vec();
    end.push(FieldTag::Position.as_byte() + 1);
    (prefix.to_vec(), end)
}

/// A key that sorts after every key of the scope.
#[must_use]
pub fn scope_end(scope: &[u8]) -> Vec<u8> {
    let mut end = scope_segment(scope).to_vec();
    end.extend_from_slice(&[0xff; POSITION_LEN + INDEX_LEN + 2]);
    end
}

/// The first key an ordered scan visits, given an exclusive cursor.
///
/// A cursor of 0 starts at the beginning of the scope. Any other cursor
/// skips every position up to and including it in scan direction.
///
/// # Errors
///
/// Returns a usage error for negative cursors and for non-zero cursors on
/// unordered scans.
pub fn scan_start(scope: &[u8], order: Order, cursor: i64) -> CoreResult<Vec<u8>> {
    if cursor == 0 {
        return Ok(scope_segment(scope).to_vec());
    }
    if cursor < 0 {
        return Err(CoreError::usage(format!(
            "scan cursor must not be negative, got {cursor}"
        )));
    }
    let next = match order {
        Order::None => {
            return Err(CoreError::usage(
                "unordered scans cannot start from a position",
            ))
        }
        Order::Ascending => match cursor.checked_add(1) {
            Some(next) => next,
            None => return Ok(scope_end(scope)),
        },
        Order::Descending => cursor - 1,
    };
    let mut key = scope_segment(scope).to_vec();
    key.extend_from_slice(&encode_position(order, next));
    Ok(key)
}

/// The first key of a bulk delete, inclusive of `position`.
///
/// # Errors
///
/// Returns a usage error for negative positions and for non-zero positions
/// on unordered indexes.
pub fn range_start(scope: &[u8], order: Order, position: i64) -> CoreResult<Vec<u8>> {
    if position == 0 {
        return Ok(scope_segment(scope).to_vec());
    }
    if position < 0 || !order.is_ordered() {
        return Err(CoreError::usage(format!(
            "cannot delete from position {position} on a {order} index"
        )));
    }
    let mut key = scope_segment(scope).to_vec();
    key.extend_from_slice(&encode_position(order, position));
    Ok(key)
}
