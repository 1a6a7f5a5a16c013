//! Atomic write batches.

/// One buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Store `value` under `key`.
    Put {
        /// Target column.
        column: String,
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
    },
    /// Remove `key`.
    Delete {
        /// Target column.
        column: String,
        /// Record key.
        key: Vec<u8>,
    },
    /// Remove every key in `[from, to)`.
    DeleteRange {
        /// Target column.
        column: String,
        /// Inclusive start.
        from: Vec<u8>,
        /// Exclusive end.
        to: Vec<u8>,
    },
}

impl BatchOp {
    /// Returns the column this operation addresses.
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Put { column, .. }
            | Self::Delete { column, .. }
            | Self::DeleteRange { column, .. } => column,
        }
    }
}

/// An ordered list of writes applied atomically by [`crate::KvStore::write`].
///
/// Operations apply in insertion order, so a put followed by a delete of the
/// same key leaves the key absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, column: impl Into<String>, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            column: column.into(),
            key,
            value,
        });
    }

    /// Queues a point delete.
    pub fn delete(&mut self, column: impl Into<String>, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete {
            column: column.into(),
            key,
        });
    }

    /// Queues a delete of every key in `[from, to)`.
    pub fn delete_range(&mut self, column: impl Into<String>, from: Vec<u8>, to: Vec<u8>) {
        self.ops.push(BatchOp::DeleteRange {
            column: column.into(),
            from,
            to,
        });
    }

    /// Returns the queued operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drops every queued operation.
    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_insertion_order() {
        let mut batch = WriteBatch::new();
        batch.put("a", b"k".to_vec(), b"v".to_vec());
        batch.delete("a", b"k".to_vec());
        batch.delete_range("b", b"0".to_vec(), b"9".to_vec());

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.ops()[0], BatchOp::Put { .. }));
        assert!(matches!(batch.ops()[1], BatchOp::Delete { .. }));
        assert_eq!(batch.ops()[2].column(), "b");
    }

    #[test]
    fn clear_empties_batch() {
        let mut batch = WriteBatch::new();
        batch.delete("a", b"k".to_vec());
        batch.clear();
        assert!(batch.is_empty());
    }
}
