//! Rows of the materialized transitive closure.
//!
//! A [`ClosureRow`] records that `child` is reachable from `parent` through
//! closure-eligible links, along one specific route of `depth + 1` links.
//! Distinct routes between the same two nodes are distinct rows.
//!
//! # Composition
//!
//! A depth-0 row stands for a direct link; its three edge ids all equal its
//! own id. Every deeper row was composed when its `direct_edge_id` row was
//! inserted, from at most three parts:
//!
//! - `entry_edge_id`: the row covering the route from `parent` up to the
//!   direct edge (equal to `direct_edge_id` when the direct edge leaves
//!   `parent` itself),
//! - `direct_edge_id`: the depth-0 row of the edge whose insertion created
//!   this row,
//! - `exit_edge_id`: the row covering the route from the direct edge to
//!   `child` (equal to `direct_edge_id` when the direct edge enters `child`).
//!
//! A row depends on each of its parts; removing a part removes the row.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{NodeId, PathId};

/// One materialized ancestor/descendant route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureRow {
    pub id: PathId,
    pub parent: NodeId,
    pub child: NodeId,
    /// Number of links on the route minus one.
    pub depth: u32,
    pub entry_edge_id: PathId,
    pub direct_edge_id: PathId,
    pub exit_edge_id: PathId,
}

impl ClosureRow {
    /// Returns `true` for a row standing for a single direct link.
    pub fn is_direct(&self) -> bool {
        self.depth == 0
    }

    /// Returns `true` if this row lists `id` as any of its parts.
    pub fn references(&self, id: PathId) -> bool {
        self.entry_edge_id == id || self.direct_edge_id == id || self.exit_edge_id == id
    }

    /// The rows this row was composed from, in route order.
    ///
    /// Empty for a depth-0 row. Otherwise the direct edge plus whichever of
    /// the entry and exit segments are distinct from it.
    pub fn components(&self) -> SmallVec<[PathId; 3]> {
        let mut parts = SmallVec::new();
        if self.is_direct() {
            return parts;
        }
        if self.entry_edge_id != self.direct_edge_id {
            parts.push(self.entry_edge_id);
        }
        parts.push(self.direct_edge_id);
        if self.exit_edge_id != self.direct_edge_id {
            parts.push(self.exit_edge_id);
        }
        parts
    }
}

/// A closure row before the store has allocated its id.
///
/// Depth-0 rows are not built through this type: their edge ids refer to
/// themselves, so the store fills them in on insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewClosureRow {
    pub parent: NodeId,
    pub child: NodeId,
    pub depth: u32,
    pub entry_edge_id: PathId,
    pub direct_edge_id: PathId,
    pub exit_edge_id: PathId,
}

impl NewClosureRow {
    /// Attaches an allocated id.
    pub fn with_id(self, id: PathId) -> ClosureRow {
        ClosureRow {
            id,
            parent: self.parent,
            child: self.child,
            depth: self.depth,
            entry_edge_id: self.entry_edge_id,
            direct_edge_id: self.direct_edge_id,
            exit_edge_id: self.exit_edge_id,
        }
    }
}
