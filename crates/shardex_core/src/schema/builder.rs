//! Schema registration.

use super::index::{EntityIndex, IndexOptions, KeyFn, MatchFn, Partition};
use super::kind::{EntityKind, IndexHandle, Kind, KindId};
use super::Schema;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Name of the index created by [`SchemaBuilder::declare`].
pub const PRIMARY_INDEX: &str = "Primary";

/// Collects kind and index declarations, then freezes them into a
/// [`Schema`].
///
/// Registration is additive and idempotent: declaring the same kind or the
/// same (kind, index name, order) again returns the existing handle.
/// Invalid declarations are reported by [`SchemaBuilder::build`].
///
/// # Example
///
/// ```rust
/// use shardex_core::{Entity, EntityId, IndexOptions, Order, SchemaBuilder};
///
/// struct Post {
///     id: EntityId,
///     author: String,
/// }
///
/// impl Entity for Post {
///     fn entity_id(&self) -> EntityId {
///         self.id
///     }
/// }
///
/// let mut builder = SchemaBuilder::new();
/// let posts = builder.declare::<Post, _>(
///     "Post",
///     |p| p.id.as_bytes().to_vec(),
///     IndexOptions::new(Order::None),
/// );
/// builder.declare_index(
///     &posts,
///     "Author",
///     |p: &Post| p.author.as_bytes().to_vec(),
///     IndexOptions::new(Order::None),
/// );
/// let schema = builder.build().unwrap();
/// assert_eq!(schema.resolve(&posts).unwrap().indexes().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    kinds: Vec<EntityKind>,
    errors: Vec<String>,
}

impl SchemaBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kind without indexes, or returns the existing one.
    pub fn kind<T: Entity>(&mut self, name: &str) -> Kind<T> {
        if let Some(slot) = self.kinds.iter().position(|k| k.name() == name) {
            if self.kinds[slot].entity_type() != TypeId::of::<T>() {
                self.errors.push(format!(
                    "kind {name} is already registered for {}",
                    self.kinds[slot].type_name()
                ));
            }
            return Kind::new(KindId(slot as u32));
        }
        let id = KindId(self.kinds.len() as u32);
        self.kinds.push(EntityKind::new::<T>(name.to_string()));
        Kind::new(id)
    }

    /// Registers a kind together with its value-holding `Primary` index.
    pub fn declare<T, F>(&mut self, name: &str, key_fn: F, options: IndexOptions) -> Kind<T>
    where
        T: Entity,
        F: Fn(&T) -> Vec<u8> + Send + Sync + 'static,
    {
        let kind = self.kind::<T>(name);
        self.declare_index(&kind, PRIMARY_INDEX, key_fn, options.with_value(true));
        kind
    }

    /// Declares an index on a kind.
    pub fn declare_index<T, F>(
        &mut self,
        kind: &Kind<T>,
        name: &str,
        key_fn: F,
        options: IndexOptions,
    ) -> IndexHandle
    where
        T: Entity,
        F: Fn(&T) -> Vec<u8> + Send + Sync + 'static,
    {
        let name = format!("{name}-{}", options.order);
        self.add_index(kind, name, options, None, erase(key_fn))
    }

    /// Declares one index per partition value. An entity is written to the
    /// partitions `matches` accepts it for.
    ///
    /// Index names take the form `{name}-{value}-{order}`.
    pub fn declare_partitioned_index<T, D, M, F>(
        &mut self,
        kind: &Kind<T>,
        name: &str,
        partitions: impl IntoIterator<Item = D>,
        matches: M,
        key_fn: F,
        options: IndexOptions,
    ) -> Vec<IndexHandle>
    where
        T: Entity,
        D: fmt::Display + Send + Sync + 'static,
        M: Fn(&T, &D) -> bool + Send + Sync + 'static,
        F: Fn(&T) -> Vec<u8> + Send + Sync + 'static,
    {
        let matches = Arc::new(matches);
        let key_fn = erase(key_fn);
        partitions
            .into_iter()
            .map(|value| {
                let label = value.to_string();
                let accept = Arc::clone(&matches);
                let match_fn: MatchFn = Arc::new(move |entity: &dyn Any| {
                    entity
                        .downcast_ref::<T>()
                        .map_or(false, |entity| accept(entity, &value))
                });
                let partition = Partition {
                    value: label.clone(),
                    matches: match_fn,
                };
                let index_name = format!("{name}-{label}-{}", options.order);
                self.add_index(kind, index_name, options, Some(partition), Arc::clone(&key_fn))
            })
            .collect()
    }

    fn add_index<T: 'static>(
        &mut self,
        kind: &Kind<T>,
        name: String,
        options: IndexOptions,
        partition: Option<Partition>,
        key_fn: KeyFn,
    ) -> IndexHandle {
        let handle = |slot| IndexHandle {
            kind: kind.id(),
            slot,
        };
        let Some(entity_kind) = self.kinds.get_mut(kind.id().slot()) else {
            self.errors
                .push(format!("index {name} refers to an unknown kind {kind:?}"));
            return handle(usize::MAX);
        };
        if entity_kind.entity_type() != TypeId::of::<T>() {
            self.errors.push(format!(
                "index {name} was declared for {} but kind {} stores {}",
                std::any::type_name::<T>(),
                entity_kind.name(),
                entity_kind.type_name()
            ));
            return handle(usize::MAX);
        }
        if let Some(slot) = entity_kind.position_of(&name) {
            return handle(slot);
        }
        if options.cache_capacity.is_some() && options.order.is_ordered() {
            self.errors.push(format!(
                "index {}-{name} is ordered; only unordered indexes can cache bodies",
                entity_kind.name()
            ));
        }
        let kind_name = entity_kind.name().to_string();
        let slot = entity_kind.push_index(EntityIndex::new(&kind_name, name, options, partition, key_fn));
        handle(slot)
    }

    /// Freezes the declarations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing every invalid declaration,
    /// or when two indexes would share a column.
    pub fn build(self) -> CoreResult<Arc<Schema>> {
        let mut errors = self.errors;
        let mut columns = HashSet::new();
        for kind in &self.kinds {
            for index in kind.indexes() {
                if !columns.insert(index.column().to_string()) {
                    errors.push(format!("column {} is declared twice", index.column()));
                }
            }
        }
        if !errors.is_empty() {
            return Err(CoreError::configuration(errors.join("; ")));
        }
        Ok(Arc::new(Schema::new(self.kinds)))
    }
}

fn erase<T, F>(key_fn: F) -> KeyFn
where
    T: 'static,
    F: Fn(&T) -> Vec<u8> + Send + Sync + 'static,
{
    Arc::new(move |entity: &dyn Any| entity.downcast_ref::<T>().map(|entity| key_fn(entity)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::types::Order;

    struct Post {
        id: EntityId,
        status: Status,
    }

    impl Entity for Post {
        fn entity_id(&self) -> EntityId {
            self.id
        }
    }

    struct Comment;

    impl Entity for Comment {
        fn entity_id(&self) -> EntityId {
            EntityId::from_u128(0)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Draft,
        Live,
    }

    impl fmt::Display for Status {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt::Debug::fmt(self, f)
        }
    }

    fn id_bytes(post: &Post) -> Vec<u8> {
        post.id.as_bytes().to_vec()
    }

    #[test]
    fn declare_creates_primary_value_index() {
        let mut builder = SchemaBuilder::new();
        let posts = builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        let schema = builder.build().unwrap();

        let kind = schema.resolve(&posts).unwrap();
        let value = kind.value_index().unwrap();
        assert_eq!(value.name(), "Primary-None");
        assert_eq!(value.column(), "Post-Primary-None");
        assert!(value.has_value());
    }

    #[test]
    fn redeclaring_returns_existing_handles() {
        let mut builder = SchemaBuilder::new();
        let a = builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        let b = builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        let first = builder.declare_index(&a, "Feed", id_bytes, IndexOptions::new(Order::Descending));
        let second = builder.declare_index(&b, "Feed", id_bytes, IndexOptions::new(Order::Descending));
        assert_eq!(a, b);
        assert_eq!(first, second);

        let schema = builder.build().unwrap();
        assert_eq!(schema.resolve(&a).unwrap().indexes().len(), 2);
    }

    #[test]
    fn same_name_different_order_is_a_new_index() {
        let mut builder = SchemaBuilder::new();
        let posts = builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        builder.declare_index(&posts, "Feed", id_bytes, IndexOptions::new(Order::Ascending));
        builder.declare_index(&posts, "Feed", id_bytes, IndexOptions::new(Order::Descending));
        let schema = builder.build().unwrap();
        let names: Vec<_> = schema
            .resolve(&posts)
            .unwrap()
            .indexes()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, ["Primary-None", "Feed-Ascending", "Feed-Descending"]);
    }

    #[test]
    fn partitioned_index_creates_one_index_per_value() {
        let mut builder = SchemaBuilder::new();
        let posts = builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        let handles = builder.declare_partitioned_index(
            &posts,
            "Status",
            [Status::Draft, Status::Live],
            |post: &Post, status: &Status| post.status == *status,
            id_bytes,
            IndexOptions::new(Order::Descending),
        );
        assert_eq!(handles.len(), 2);

        let schema = builder.build().unwrap();
        let draft = schema.index(handles[0]).unwrap();
        let live = schema.index(handles[1]).unwrap();
        assert_eq!(draft.name(), "Status-Draft-Descending");
        assert_eq!(live.partition(), Some("Live"));

        let post = Post {
            id: EntityId::new(),
            status: Status::Live,
        };
        assert!(!draft.accepts(&post));
        assert!(live.accepts(&post));
    }

    #[test]
    fn partitioned_value_index_is_not_the_value_index() {
        let mut builder = SchemaBuilder::new();
        let posts = builder.kind::<Post>("Post");
        builder.declare_partitioned_index(
            &posts,
            "Status",
            [Status::Draft],
            |post: &Post, status: &Status| post.status == *status,
            id_bytes,
            IndexOptions::new(Order::None).with_value(true),
        );
        let schema = builder.build().unwrap();
        let err = schema.resolve(&posts).unwrap().value_index().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn ordered_cache_is_rejected() {
        let mut builder = SchemaBuilder::new();
        builder.declare("Post", id_bytes, IndexOptions::new(Order::Ascending).cache(8));
        assert!(builder.build().unwrap_err().is_configuration());
    }

    #[test]
    fn kind_name_reused_for_other_type_is_rejected() {
        let mut builder = SchemaBuilder::new();
        builder.kind::<Post>("Post");
        builder.kind::<Comment>("Post");
        assert!(builder.build().unwrap_err().is_configuration());
    }

    #[test]
    fn index_on_kind_of_other_type_is_rejected() {
        let mut other = SchemaBuilder::new();
        let comments = other.kind::<Comment>("Comment");

        let mut builder = SchemaBuilder::new();
        builder.declare("Post", id_bytes, IndexOptions::new(Order::None));
        let handle = builder.declare_index(
            &comments,
            "Thread",
            |_: &Comment| vec![0],
            IndexOptions::new(Order::Descending),
        );
        assert_eq!(handle.slot, usize::MAX);

        let err = builder.build().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Thread-Descending"));
    }

    #[test]
    fn kind_without_indexes_fails_at_first_use() {
        let mut builder = SchemaBuilder::new();
        let comments = builder.kind::<Comment>("Comment");
        let schema = builder.build().unwrap();
        assert!(schema.resolve(&comments).unwrap_err().is_configuration());
    }
}
