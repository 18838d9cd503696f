use thiserror::Error;

use crate::types::ObjectId;

/// Errors reported by the spatial index.
///
/// Absent-key operations are uniformly errors: `remove` and `reindex_object`
/// on an unknown id fail with [`IndexError::UnknownId`], and `insert` never
/// overwrites an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IndexError {
    /// `insert` was called with an id that is already indexed.
    #[error("object id {0} is already indexed")]
    DuplicateId(ObjectId),
    /// The id is not present in this index.
    #[error("object id {0} is not indexed")]
    UnknownId(ObjectId),
    /// A pool cannot address more records (handle space exhausted).
    #[error("pool capacity exhausted")]
    CapacityExhausted,
    /// The allocator refused to grow a pool.
    #[error("allocation failed while growing a pool")]
    AllocationFailed,
    /// A structural invariant of the tree or pair lists does not hold.
    #[error("tree invariant violated: {0}")]
    Corrupt(&'static str),
}
