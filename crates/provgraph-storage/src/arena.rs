//! In-memory closure table.
//!
//! Rows live in a flat arena: `PathId(n)` occupies slot `n - 1`, and a
//! deleted row leaves its slot empty so ids are never reused. Secondary
//! indices cover every lookup [`ClosureTable`] needs without scanning.
//!
//! Between [`ClosureArena::begin`] and [`ClosureArena::commit`] the arena
//! journals what it appends and removes, so [`ClosureArena::rollback`] can
//! put it back exactly, id sequence included.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;

use provgraph_core::{ClosureRow, NewClosureRow, NodeId, PathId};

use crate::error::StorageError;
use crate::table::ClosureTable;

/// Arena-backed [`ClosureTable`].
#[derive(Debug, Clone, Default)]
pub struct ClosureArena {
    slots: Vec<Option<ClosureRow>>,
    live: usize,
    by_parent: HashMap<NodeId, IndexSet<PathId>>,
    by_child: HashMap<NodeId, IndexSet<PathId>>,
    /// Depth-0 row per pair.
    direct: HashMap<(NodeId, NodeId), PathId>,
    /// Number of rows per pair, any depth.
    pair_rows: HashMap<(NodeId, NodeId), usize>,
    /// Component row -> rows composed from it.
    dependents: HashMap<PathId, SmallVec<[PathId; 4]>>,
    journal: Option<Journal>,
}

/// Undo log of one open mutation.
#[derive(Debug, Clone, Default)]
struct Journal {
    /// Slot count when the mutation began; later slots are new rows.
    slots_len: usize,
    /// Pre-existing rows removed since then.
    removed: Vec<ClosureRow>,
}

impl ClosureArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Starts journaling. A second call restarts the journal from the
    /// current state.
    pub fn begin(&mut self) {
        self.journal = Some(Journal {
            slots_len: self.slots.len(),
            removed: Vec::new(),
        });
    }

    /// Keeps every change since [`begin`](Self::begin).
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undoes every change since [`begin`](Self::begin). Without an open
    /// journal this does nothing.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        while self.slots.len() > journal.slots_len {
            if let Some(Some(row)) = self.slots.pop() {
                self.unindex(&row);
                self.live -= 1;
            }
        }
        let mut removed = journal.removed;
        removed.sort_by_key(|r| r.id);
        for row in removed {
            if let Some(slot) = slot_of(row.id).and_then(|n| self.slots.get_mut(n)) {
                *slot = Some(row);
                self.index(&row);
                self.live += 1;
            }
        }
        tracing::debug!(rows = self.live, "closure arena rolled back");
    }

    /// Live rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = &ClosureRow> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    fn get(&self, id: PathId) -> Option<&ClosureRow> {
        self.slots.get(slot_of(id)?)?.as_ref()
    }

    fn next_id(&self) -> PathId {
        PathId(self.slots.len() as i64 + 1)
    }

    fn sorted_rows(&self, ids: Option<&IndexSet<PathId>>) -> Vec<ClosureRow> {
        let mut rows: Vec<ClosureRow> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(*id).copied())
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    fn push(&mut self, row: ClosureRow) {
        self.index(&row);
        self.slots.push(Some(row));
        self.live += 1;
    }

    fn index(&mut self, row: &ClosureRow) {
        self.by_parent.entry(row.parent).or_default().insert(row.id);
        self.by_child.entry(row.child).or_default().insert(row.id);
        *self.pair_rows.entry((row.parent, row.child)).or_default() += 1;
        if row.is_direct() {
            self.direct.insert((row.parent, row.child), row.id);
        }
        for part in row.components() {
            self.dependents.entry(part).or_default().push(row.id);
        }
    }

    fn unindex(&mut self, row: &ClosureRow) {
        if let Some(set) = self.by_parent.get_mut(&row.parent) {
            set.shift_remove(&row.id);
            if set.is_empty() {
                self.by_parent.remove(&row.parent);
            }
        }
        if let Some(set) = self.by_child.get_mut(&row.child) {
            set.shift_remove(&row.id);
            if set.is_empty() {
                self.by_child.remove(&row.child);
            }
        }
        let pair = (row.parent, row.child);
        if let Some(count) = self.pair_rows.get_mut(&pair) {
            *count -= 1;
            if *count == 0 {
                self.pair_rows.remove(&pair);
            }
        }
        if row.is_direct() && self.direct.get(&pair) == Some(&row.id) {
            self.direct.remove(&pair);
        }
        for part in row.components() {
            if let Some(list) = self.dependents.get_mut(&part) {
                list.retain(|id| *id != row.id);
                if list.is_empty() {
                    self.dependents.remove(&part);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn add_dependent(&mut self, part: PathId, id: PathId) {
        self.dependents.entry(part).or_default().push(id);
    }
}

fn slot_of(id: PathId) -> Option<usize> {
    usize::try_from(id.0).ok()?.checked_sub(1)
}

impl ClosureTable for ClosureArena {
    fn direct_row(&self, parent: NodeId, child: NodeId) -> Result<Option<PathId>, StorageError> {
        Ok(self.direct.get(&(parent, child)).copied())
    }

    fn path_exists(&self, parent: NodeId, child: NodeId) -> Result<bool, StorageError> {
        Ok(self.pair_rows.contains_key(&(parent, child)))
    }

    fn rows_ending_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
        Ok(self.sorted_rows(self.by_child.get(&node)))
    }

    fn rows_starting_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
        Ok(self.sorted_rows(self.by_parent.get(&node)))
    }

    fn rows_referencing(&self, ids: &[PathId]) -> Result<Vec<PathId>, StorageError> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(list) = self.dependents.get(id) {
                out.extend(list.iter().copied());
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn insert_direct(&mut self, parent: NodeId, child: NodeId) -> Result<PathId, StorageError> {
        if self.direct.contains_key(&(parent, child)) {
            return Err(StorageError::Inconsistent {
                reason: format!("second depth-0 row for {} -> {}", parent, child),
            });
        }
        let id = self.next_id();
        self.push(ClosureRow {
            id,
            parent,
            child,
            depth: 0,
            entry_edge_id: id,
            direct_edge_id: id,
            exit_edge_id: id,
        });
        Ok(id)
    }

    fn insert_row(&mut self, row: NewClosureRow) -> Result<PathId, StorageError> {
        for part in [row.entry_edge_id, row.direct_edge_id, row.exit_edge_id] {
            if self.get(part).is_none() {
                return Err(StorageError::Inconsistent {
                    reason: format!(
                        "row {} -> {} references missing row {}",
                        row.parent, row.child, part
                    ),
                });
            }
        }
        let id = self.next_id();
        self.push(row.with_id(id));
        Ok(id)
    }

    fn delete_rows(&mut self, ids: &[PathId]) -> Result<usize, StorageError> {
        let mut removed = 0;
        for id in ids {
            let Some(row) = slot_of(*id)
                .and_then(|n| self.slots.get_mut(n))
                .and_then(Option::take)
            else {
                continue;
            };
            self.unindex(&row);
            self.live -= 1;
            removed += 1;
            if let Some(journal) = &mut self.journal {
                journal.removed.push(row);
            }
        }
        Ok(removed)
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        Ok(self.live)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for slot in &mut self.slots {
            if let (Some(row), Some(journal)) = (slot.take(), &mut self.journal) {
                journal.removed.push(row);
            }
        }
        self.live = 0;
        self.by_parent.clear();
        self.by_child.clear();
        self.direct.clear();
        self.pair_rows.clear();
        self.dependents.clear();
        Ok(())
    }
}
