//! The [`ClosureTable`] trait: the storage seam the propagators run against.
//!
//! A closure table stores [`ClosureRow`]s and answers the handful of indexed
//! lookups incremental maintenance needs:
//! - depth-0 row for a `(parent, child)` pair (duplicate check),
//! - any row for a `(parent, child)` pair (cycle check),
//! - rows ending at / starting at a node (tail and head paths),
//! - rows whose entry, direct or exit id falls in a set (cascade).
//!
//! Implementations must return rows ordered by id so that every backend
//! allocates the same ids for the same sequence of mutations.

use provgraph_core::{ClosureRow, NewClosureRow, NodeId, PathId};

use crate::error::StorageError;
use crate::purge::PurgeList;

/// Storage for closure rows, mutated only by
/// [`ClosureMaintainer`](crate::maintainer::ClosureMaintainer).
pub trait ClosureTable {
    /// Id of the depth-0 row for `parent -> child`, if any.
    fn direct_row(&self, parent: NodeId, child: NodeId) -> Result<Option<PathId>, StorageError>;

    /// Whether any row (of any depth) connects `parent` to `child`.
    fn path_exists(&self, parent: NodeId, child: NodeId) -> Result<bool, StorageError>;

    /// Rows with `child == node`, ordered by id.
    fn rows_ending_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError>;

    /// Rows with `parent == node`, ordered by id.
    fn rows_starting_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError>;

    /// Ids of rows whose entry, direct or exit id is in `ids`.
    ///
    /// May include members of `ids` themselves (a depth-0 row references
    /// its own id).
    fn rows_referencing(&self, ids: &[PathId]) -> Result<Vec<PathId>, StorageError>;

    /// Inserts the depth-0 row for a link, with all three edge ids set to
    /// the new row's own id.
    fn insert_direct(&mut self, parent: NodeId, child: NodeId) -> Result<PathId, StorageError>;

    /// Inserts a composed row.
    fn insert_row(&mut self, row: NewClosureRow) -> Result<PathId, StorageError>;

    /// Deletes rows by id, returning how many existed.
    fn delete_rows(&mut self, ids: &[PathId]) -> Result<usize, StorageError>;

    /// Number of rows currently stored.
    fn row_count(&self) -> Result<usize, StorageError>;

    /// Removes every row. Ids are still never reused afterwards.
    fn clear(&mut self) -> Result<(), StorageError>;

    /// Removes `seed` and every row that transitively depends on it.
    ///
    /// Returns the removed ids. The default runs the [`PurgeList`] work queue
    /// against [`rows_referencing`](Self::rows_referencing); backends with a
    /// native set-based loop may override it.
    fn purge_dependents(&mut self, seed: PathId) -> Result<Vec<PathId>, StorageError> {
        let bound = self.row_count()?;
        let ids = PurgeList::collect(&*self, seed, bound)?.into_ids();
        let removed = self.delete_rows(&ids)?;
        if removed != ids.len() {
            return Err(StorageError::Inconsistent {
                reason: format!(
                    "purge from row {} scheduled {} rows but removed {}",
                    seed,
                    ids.len(),
                    removed
                ),
            });
        }
        Ok(ids)
    }
}
