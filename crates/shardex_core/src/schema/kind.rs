//! Entity kinds and registration handles.

use super::index::EntityIndex;
use crate::error::{CoreError, CoreResult};
use crate::types::Order;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

/// Position of a kind in its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KindId(pub(crate) u32);

impl KindId {
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Typed handle to a registered kind.
///
/// Handles replace runtime type-name lookup: every transaction operation
/// takes the handle returned at registration.
pub struct Kind<T> {
    id: KindId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Kind<T> {
    pub(crate) const fn new(id: KindId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The kind's id.
    #[must_use]
    pub const fn id(&self) -> KindId {
        self.id
    }
}

impl<T> Clone for Kind<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Kind<T> {}

impl<T> PartialEq for Kind<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Kind<T> {}

impl<T> fmt::Debug for Kind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({}, {})", self.id.0, std::any::type_name::<T>())
    }
}

/// Handle to one declared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexHandle {
    pub(crate) kind: KindId,
    pub(crate) slot: usize,
}

impl IndexHandle {
    /// The kind the index belongs to.
    #[must_use]
    pub const fn kind(&self) -> KindId {
        self.kind
    }
}

/// A registered entity kind and its indexes.
#[derive(Debug)]
pub struct EntityKind {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    indexes: Vec<EntityIndex>,
    value_index: Option<usize>,
}

impl EntityKind {
    pub(crate) fn new<T: 'static>(name: String) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            indexes: Vec::new(),
            value_index: None,
        }
    }

    /// Kind name, used as the column prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type stored under this kind.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn entity_type(&self) -> TypeId {
        self.type_id
    }

    /// Declared indexes, in registration order.
    #[must_use]
    pub fn indexes(&self) -> &[EntityIndex] {
        &self.indexes
    }

    /// Looks an index up by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&EntityIndex> {
        self.position_of(name).map(|slot| &self.indexes[slot])
    }

    pub(crate) fn position_of(&self, name: &str) -> Option<usize> {
        self.indexes.iter().position(|index| index.name() == name)
    }

    /// The index holding bodies that pointer indexes refer to.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the kind has no value-holding,
    /// unpartitioned index.
    pub fn value_index(&self) -> CoreResult<&EntityIndex> {
        self.value_index
            .map(|slot| &self.indexes[slot])
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "kind {} has no value index; declare an unpartitioned index with a value",
                    self.name
                ))
            })
    }

    pub(crate) fn value_slot(&self) -> Option<usize> {
        self.value_index
    }

    /// Adds an index and returns its slot.
    ///
    /// The first unpartitioned value-holding index becomes the value index.
    /// A later unordered one takes over from an ordered value index.
    pub(crate) fn push_index(&mut self, index: EntityIndex) -> usize {
        let slot = self.indexes.len();
        if index.has_value() && !index.is_partitioned() {
            let replace = match self.value_index {
                None => true,
                Some(current) => {
                    self.indexes[current].order().is_ordered() && index.order() == Order::None
                }
            };
            if replace {
                self.value_index = Some(slot);
            }
        }
        self.indexes.push(index);
        slot
    }

    /// Ensures the kind can be used by transactions.
    pub(crate) fn ensure_usable(&self) -> CoreResult<()> {
        if self.indexes.is_empty() {
            return Err(CoreError::configuration(format!(
                "kind {} has no indexes",
                self.name
            )));
        }
        Ok(())
    }
}
