//! Point-in-time captures of the Closure Store.
//!
//! A [`ClosureSnapshot`] supports two comparisons:
//! - [`diff`](ClosureSnapshot::diff) by row id, to check that a mutation
//!   touched only the rows it should have,
//! - [`fingerprint`](ClosureSnapshot::fingerprint) over the id-free
//!   `(parent, child, depth)` multiset, to compare closures built by
//!   different backends or different insertion orders.

use std::collections::BTreeMap;

use serde::Serialize;

use provgraph_core::{ClosureRow, NodeId, PathId};

/// All closure rows at one moment, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosureSnapshot {
    rows: Vec<ClosureRow>,
}

/// Rows that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<ClosureRow>,
    pub removed: Vec<ClosureRow>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl ClosureSnapshot {
    pub fn from_rows(mut rows: Vec<ClosureRow>) -> Self {
        rows.sort_by_key(|r| r.id);
        ClosureSnapshot { rows }
    }

    pub fn rows(&self) -> &[ClosureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted `(parent, child, depth)` triples, duplicates kept.
    pub fn triples(&self) -> Vec<(NodeId, NodeId, u32)> {
        let mut out: Vec<_> = self
            .rows
            .iter()
            .map(|r| (r.parent, r.child, r.depth))
            .collect();
        out.sort();
        out
    }

    /// Rows added in `later` and rows of `self` missing from it, by id.
    pub fn diff(&self, later: &ClosureSnapshot) -> SnapshotDiff {
        let before: BTreeMap<PathId, &ClosureRow> = self.rows.iter().map(|r| (r.id, r)).collect();
        let after: BTreeMap<PathId, &ClosureRow> = later.rows.iter().map(|r| (r.id, r)).collect();

        let added = later
            .rows
            .iter()
            .filter(|r| before.get(&r.id) != Some(r))
            .copied()
            .collect();
        let removed = self
            .rows
            .iter()
            .filter(|r| after.get(&r.id) != Some(r))
            .copied()
            .collect();
        SnapshotDiff { added, removed }
    }

    /// Digest of the id-free triple multiset.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for (parent, child, depth) in self.triples() {
            hasher.update(&parent.0.to_le_bytes());
            hasher.update(&child.0.to_le_bytes());
            hasher.update(&depth.to_le_bytes());
        }
        hasher.finalize()
    }
}
