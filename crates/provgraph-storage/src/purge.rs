//! Work-queue fixed point for deletion cascades.
//!
//! [`PurgeList`] is an insertion-ordered set of closure row ids. The prefix
//! already expanded sits before `cursor`; everything after it is the pending
//! frontier. Each round asks the table which rows reference the frontier and
//! appends the ones not yet listed, until a round adds nothing.

use indexmap::IndexSet;

use provgraph_core::PathId;

use crate::error::StorageError;
use crate::table::ClosureTable;

/// Ids of closure rows scheduled for removal.
#[derive(Debug, Clone, Default)]
pub struct PurgeList {
    ids: IndexSet<PathId>,
    cursor: usize,
}

impl PurgeList {
    /// Starts a cascade from one row.
    pub fn seeded(seed: PathId) -> Self {
        let mut ids = IndexSet::new();
        ids.insert(seed);
        PurgeList { ids, cursor: 0 }
    }

    /// Adds an id, returning `true` if it was not already scheduled.
    pub fn push(&mut self, id: PathId) -> bool {
        self.ids.insert(id)
    }

    /// Takes the ids added since the previous call.
    pub fn next_frontier(&mut self) -> Vec<PathId> {
        let frontier: Vec<PathId> = self.ids.iter().skip(self.cursor).copied().collect();
        self.cursor = self.ids.len();
        frontier
    }

    pub fn contains(&self, id: PathId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Scheduled ids in the order they were discovered.
    pub fn into_ids(self) -> Vec<PathId> {
        self.ids.into_iter().collect()
    }

    /// Expands `seed` to every row that transitively depends on it.
    ///
    /// `bound` is the number of rows in the table. Every productive round
    /// adds at least one id, so more than `bound + 1` rounds means the table
    /// is answering inconsistently.
    pub fn collect<T: ClosureTable + ?Sized>(
        table: &T,
        seed: PathId,
        bound: usize,
    ) -> Result<Self, StorageError> {
        let mut list = PurgeList::seeded(seed);
        let mut rounds = 0usize;
        loop {
            let frontier = list.next_frontier();
            if frontier.is_empty() {
                break;
            }
            rounds += 1;
            if rounds > bound + 1 {
                return Err(StorageError::Inconsistent {
                    reason: format!(
                        "purge cascade from row {} did not reach a fixed point after {} rounds",
                        seed, rounds
                    ),
                });
            }
            for id in table.rows_referencing(&frontier)? {
                list.push(id);
            }
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provgraph_core::{ClosureRow, NewClosureRow, NodeId};

    #[test]
    fn frontier_advances_past_expanded_ids() {
        let mut list = PurgeList::seeded(PathId(1));
        assert_eq!(list.next_frontier(), vec![PathId(1)]);
        assert!(list.next_frontier().is_empty());

        assert!(list.push(PathId(4)));
        assert!(list.push(PathId(2)));
        assert!(!list.push(PathId(1)));
        assert_eq!(list.next_frontier(), vec![PathId(4), PathId(2)]);
        assert_eq!(list.len(), 3);
        assert!(list.contains(PathId(2)));
    }

    /// Answers every lookup with the next id up, so a cascade never settles.
    struct Endless;

    impl ClosureTable for Endless {
        fn direct_row(&self, _: NodeId, _: NodeId) -> Result<Option<PathId>, StorageError> {
            Ok(None)
        }

        fn path_exists(&self, _: NodeId, _: NodeId) -> Result<bool, StorageError> {
            Ok(false)
        }

        fn rows_ending_at(&self, _: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
            Ok(Vec::new())
        }

        fn rows_starting_at(&self, _: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
            Ok(Vec::new())
        }

        fn rows_referencing(&self, ids: &[PathId]) -> Result<Vec<PathId>, StorageError> {
            Ok(ids.iter().map(|id| PathId(id.0 + 1)).collect())
        }

        fn insert_direct(&mut self, _: NodeId, _: NodeId) -> Result<PathId, StorageError> {
            unreachable!()
        }

        fn insert_row(&mut self, _: NewClosureRow) -> Result<PathId, StorageError> {
            unreachable!()
        }

        fn delete_rows(&mut self, ids: &[PathId]) -> Result<usize, StorageError> {
            Ok(ids.len())
        }

        fn row_count(&self) -> Result<usize, StorageError> {
            Ok(3)
        }

        fn clear(&mut self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn runaway_cascade_is_reported_inconsistent() {
        let err = PurgeList::collect(&Endless, PathId(1), 3).unwrap_err();
        match err {
            StorageError::Inconsistent { reason } => {
                assert!(reason.contains("after 5 rounds"), "{}", reason)
            }
            other => panic!("expected inconsistency, got {:?}", other),
        }

        let err = Endless.purge_dependents(PathId(1)).unwrap_err();
        assert!(matches!(err, StorageError::Inconsistent { .. }));
    }

    #[test]
    fn into_ids_keeps_discovery_order() {
        let mut list = PurgeList::seeded(PathId(7));
        list.push(PathId(3));
        list.push(PathId(9));
        assert_eq!(list.into_ids(), vec![PathId(7), PathId(3), PathId(9)]);
    }
}
