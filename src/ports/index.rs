//! # Metric Index Port
//!
//! Trait contract for range-searchable metric back-ends.
//!
//! Two adapters implement it: the disk-resident metric tree and the paged
//! sequential scan. A query driver only ever talks to this trait, which is
//! what keeps the back-ends interchangeable: for any dataset, query and
//! radius, both must return the same result multiset.

use thiserror::Error;

use crate::core::{ComplexObject, DistanceError, ObjectError};

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    /// A distance evaluation failed
    #[error(transparent)]
    Distance(#[from] DistanceError),

    /// An object record could not be decoded
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// Page I/O failed
    #[error("page i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored node does not decode to a valid tree page
    #[error("corrupt index node: {0}")]
    Corrupt(String),

    /// Back-end specific failure
    #[error("{0}")]
    Backend(String),
}

/// A metric index over complex objects
///
/// Implementations own clones of everything inserted; query results are
/// fresh owned objects. Result order within one query is unspecified.
pub trait MetricIndex {
    /// Insert a clone of `object` into the index
    fn insert(&mut self, object: &ComplexObject) -> IndexResult<()>;

    /// All stored objects within `radius` of `query`
    fn range_query(&mut self, query: &ComplexObject, radius: f64)
        -> IndexResult<Vec<ComplexObject>>;

    /// At most `k` stored objects closest to `query`, sorted ascending by
    /// distance
    fn nearest_query(&mut self, query: &ComplexObject, k: usize)
        -> IndexResult<Vec<ComplexObject>>;

    /// Number of objects stored
    fn object_count(&self) -> usize;

    /// Zero the distance and page counters
    fn reset_statistics(&mut self);

    /// Pages read since the last reset
    fn page_reads(&self) -> u64;

    /// Pages written since the last reset
    fn page_writes(&self) -> u64;

    /// True when nothing has been inserted
    fn is_empty(&self) -> bool {
        self.object_count() == 0
    }
}
