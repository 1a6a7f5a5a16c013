//! Entity kinds, their indexes and the frozen schema.

mod builder;
mod cache;
mod index;
mod kind;
mod tuning;

pub use builder::{SchemaBuilder, PRIMARY_INDEX};
pub use cache::IndexCache;
pub use index::{EntityIndex, IndexOptions};
pub use kind::{EntityKind, IndexHandle, Kind, KindId};
pub use tuning::column_tuning;

use crate::config::Media;
use crate::error::{CoreError, CoreResult};
use shardex_storage::ColumnSpec;
use std::any::TypeId;

/// The frozen set of kinds and indexes a repository serves.
///
/// Built once by [`SchemaBuilder::build`] and shared read-only.
#[derive(Debug)]
pub struct Schema {
    kinds: Vec<EntityKind>,
}

impl Schema {
    fn new(kinds: Vec<EntityKind>) -> Self {
        Self { kinds }
    }

    /// Starts a new schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Every registered kind.
    #[must_use]
    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    /// Looks a kind up by name.
    #[must_use]
    pub fn kind_by_name(&self, name: &str) -> Option<&EntityKind> {
        self.kinds.iter().find(|kind| kind.name() == name)
    }

    /// Resolves a handle to its kind.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the handle does not belong to this
    /// schema or the kind has no indexes.
    pub fn resolve<T: 'static>(&self, kind: &Kind<T>) -> CoreResult<&EntityKind> {
        let entity_kind = self
            .kinds
            .get(kind.id().slot())
            .filter(|entity_kind| entity_kind.entity_type() == TypeId::of::<T>())
            .ok_or_else(|| {
                CoreError::configuration(format!("{kind:?} is not registered in this schema"))
            })?;
        entity_kind.ensure_usable()?;
        Ok(entity_kind)
    }

    /// Resolves an index handle.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the handle does not belong to this
    /// schema.
    pub fn index(&self, handle: IndexHandle) -> CoreResult<&EntityIndex> {
        self.kinds
            .get(handle.kind.slot())
            .and_then(|kind| kind.indexes().get(handle.slot))
            .ok_or_else(|| CoreError::configuration(format!("{handle:?} is not registered")))
    }

    /// Every column a store instance must open, tuned for `media`.
    #[must_use]
    pub fn columns(&self, media: Media) -> Vec<ColumnSpec> {
        self.kinds
            .iter()
            .flat_map(|kind| kind.indexes())
            .map(|index| ColumnSpec::new(index.column()).with_tuning(index.tuning(media)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityId};
    use crate::types::Order;

    struct Thing(EntityId);

    impl Entity for Thing {
        fn entity_id(&self) -> EntityId {
            self.0
        }
    }

    struct Other;

    impl Entity for Other {
        fn entity_id(&self) -> EntityId {
            EntityId::from_u128(0)
        }
    }

    #[test]
    fn columns_cover_every_index() {
        let mut builder = Schema::builder();
        let things = builder.declare("Thing", |t: &Thing| t.0.as_bytes().to_vec(), IndexOptions::new(Order::None));
        builder.declare_index(&things, "Feed", |t: &Thing| t.0.as_bytes().to_vec(), IndexOptions::new(Order::Descending));
        let schema = builder.build().unwrap();

        let columns = schema.columns(Media::Ssd);
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Thing-Primary-None", "Thing-Feed-Descending"]);
        assert!(columns[0].tuning.whole_key_filtering);
        assert!(!columns[1].tuning.whole_key_filtering);
    }

    #[test]
    fn handle_of_other_type_is_rejected() {
        let mut builder = Schema::builder();
        builder.declare("Thing", |t: &Thing| t.0.as_bytes().to_vec(), IndexOptions::new(Order::None));
        let schema = builder.build().unwrap();

        let mut other = Schema::builder();
        let foreign = other.declare("Other", |_: &Other| Vec::new(), IndexOptions::new(Order::None));
        assert!(schema.resolve(&foreign).unwrap_err().is_configuration());
    }

    #[test]
    fn kind_lookup_by_name() {
        let mut builder = Schema::builder();
        builder.declare("Thing", |t: &Thing| t.0.as_bytes().to_vec(), IndexOptions::new(Order::None));
        let schema = builder.build().unwrap();
        assert!(schema.kind_by_name("Thing").is_some());
        assert!(schema.kind_by_name("Nope").is_none());
    }
}
