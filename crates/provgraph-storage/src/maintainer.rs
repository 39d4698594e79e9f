//! Incremental maintenance of the transitive closure.
//!
//! [`ClosureMaintainer`] is invoked by the Edge Store inside the same
//! transaction as the link mutation that triggers it:
//!
//! - [`on_insert`](ClosureMaintainer::on_insert) adds the depth-0 row for a
//!   new closure-eligible link `p -> c`, then one row per route that now
//!   passes through it: every path into `p` extended by the link, the link
//!   prepended to every path out of `c`, and every combination of the two.
//! - [`on_delete`](ClosureMaintainer::on_delete) removes the depth-0 row and,
//!   to a fixed point, every row composed (directly or indirectly) from a
//!   removed row.
//!
//! Each derived row records the rows it was composed from (see
//! [`provgraph_core::path`]), which is what makes the deletion cascade exact:
//! a row disappears precisely when one of its parts does.
//!
//! Reads happen before writes in both propagators, so a table that fails
//! during the read phase is left untouched.

use provgraph_core::{CoreError, Link, NewClosureRow, NodeId, PathId};

use crate::config::CyclePolicy;
use crate::error::StorageError;
use crate::table::ClosureTable;

/// How the closure would treat a candidate edge `parent -> child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No depth-0 row yet and no reverse route: the edge will be propagated.
    New,
    /// A depth-0 row for the pair already exists.
    Duplicate(PathId),
    /// `child` already reaches `parent`; the edge would close a cycle.
    Cycle,
    /// `parent == child`.
    SelfLoop,
}

/// Result of running the Insertion Propagator for one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The depth-0 row `direct` and `rows_added - 1` derived rows were added.
    Propagated { direct: PathId, rows_added: usize },
    /// Nothing was added; the pair was already tracked by `direct`.
    AlreadyTracked { direct: PathId },
    /// Nothing was added; the edge would close a cycle.
    SkippedCycle,
    /// Nothing was added; the edge is a self-loop.
    SkippedSelfLoop,
}

impl InsertOutcome {
    /// Number of closure rows the propagation created.
    pub fn rows_added(&self) -> usize {
        match self {
            InsertOutcome::Propagated { rows_added, .. } => *rows_added,
            _ => 0,
        }
    }
}

/// Runs the Insertion and Deletion Propagators against a [`ClosureTable`].
///
/// Stateless; backends hold one by value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosureMaintainer;

impl ClosureMaintainer {
    pub fn new() -> Self {
        ClosureMaintainer
    }

    /// Classifies a candidate edge without touching the table.
    pub fn classify<T: ClosureTable + ?Sized>(
        &self,
        table: &T,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Admission, StorageError> {
        if parent == child {
            return Ok(Admission::SelfLoop);
        }
        if let Some(direct) = table.direct_row(parent, child)? {
            return Ok(Admission::Duplicate(direct));
        }
        if table.path_exists(child, parent)? {
            return Ok(Admission::Cycle);
        }
        Ok(Admission::New)
    }

    /// Applies the cycle policy to a link about to be stored.
    ///
    /// Under [`CyclePolicy::Reject`] a cycle-closing link fails with
    /// [`StorageError::Cycle`]; under [`CyclePolicy::Untrack`] its
    /// `include_in_closure` flag is cleared. Links that are not
    /// closure-eligible pass through unchanged.
    pub fn admit<T: ClosureTable + ?Sized>(
        &self,
        table: &T,
        link: &mut Link,
        policy: CyclePolicy,
    ) -> Result<Admission, StorageError> {
        if !link.include_in_closure {
            return Ok(Admission::New);
        }
        let admission = self.classify(table, link.input, link.output)?;
        match admission {
            Admission::New | Admission::Duplicate(_) => {}
            Admission::SelfLoop => {
                return Err(StorageError::IntegrityError {
                    reason: format!("self-loop on node {}", link.input),
                });
            }
            Admission::Cycle => match policy {
                CyclePolicy::Reject => {
                    tracing::warn!(
                        input = link.input.0,
                        output = link.output.0,
                        "rejecting link that would close a cycle"
                    );
                    return Err(StorageError::Cycle {
                        input: link.input,
                        output: link.output,
                    });
                }
                CyclePolicy::Untrack => {
                    tracing::warn!(
                        input = link.input.0,
                        output = link.output.0,
                        "storing cycle-closing link outside the closure"
                    );
                    link.include_in_closure = false;
                }
            },
        }
        Ok(admission)
    }

    /// Insertion Propagator for a new closure-eligible edge `parent -> child`.
    pub fn on_insert<T: ClosureTable + ?Sized>(
        &self,
        table: &mut T,
        parent: NodeId,
        child: NodeId,
    ) -> Result<InsertOutcome, StorageError> {
        match self.classify(&*table, parent, child)? {
            Admission::New => {}
            Admission::Duplicate(direct) => {
                return Ok(InsertOutcome::AlreadyTracked { direct });
            }
            Admission::Cycle => return Ok(InsertOutcome::SkippedCycle),
            Admission::SelfLoop => return Ok(InsertOutcome::SkippedSelfLoop),
        }

        // Read phase: routes into the tail and out of the head, as they
        // stood before this edge existed.
        let tails = table.rows_ending_at(parent)?;
        let heads = table.rows_starting_at(child)?;

        let direct = table.insert_direct(parent, child)?;
        let mut rows_added = 1usize;

        for tail in &tails {
            table.insert_row(NewClosureRow {
                parent: tail.parent,
                child,
                depth: tail.depth + 1,
                entry_edge_id: tail.id,
                direct_edge_id: direct,
                exit_edge_id: direct,
            })?;
            rows_added += 1;
        }

        for head in &heads {
            table.insert_row(NewClosureRow {
                parent,
                child: head.child,
                depth: head.depth + 1,
                entry_edge_id: direct,
                direct_edge_id: direct,
                exit_edge_id: head.id,
            })?;
            rows_added += 1;
        }

        for tail in &tails {
            for head in &heads {
                table.insert_row(NewClosureRow {
                    parent: tail.parent,
                    child: head.child,
                    depth: tail.depth + head.depth + 2,
                    entry_edge_id: tail.id,
                    direct_edge_id: direct,
                    exit_edge_id: head.id,
                })?;
                rows_added += 1;
            }
        }

        tracing::debug!(
            parent = parent.0,
            child = child.0,
            direct = direct.0,
            rows_added,
            "propagated edge insertion"
        );
        Ok(InsertOutcome::Propagated { direct, rows_added })
    }

    /// Deletion Propagator for a removed closure-eligible edge `parent -> child`.
    ///
    /// Returns the ids of the removed rows; empty if the pair had no depth-0
    /// row.
    pub fn on_delete<T: ClosureTable + ?Sized>(
        &self,
        table: &mut T,
        parent: NodeId,
        child: NodeId,
    ) -> Result<Vec<PathId>, StorageError> {
        let Some(seed) = table.direct_row(parent, child)? else {
            tracing::debug!(
                parent = parent.0,
                child = child.0,
                "no depth-0 row for deleted edge"
            );
            return Ok(Vec::new());
        };

        let purged = table.purge_dependents(seed)?;
        tracing::debug!(
            parent = parent.0,
            child = child.0,
            seed = seed.0,
            rows_purged = purged.len(),
            "propagated edge deletion"
        );
        Ok(purged)
    }

    /// Empties the table and replays the Insertion Propagator for each pair.
    ///
    /// Pairs must be distinct and acyclic; anything else means the Edge Store
    /// holds links the closure could never have admitted.
    pub fn rebuild<T, I>(&self, table: &mut T, pairs: I) -> Result<usize, StorageError>
    where
        T: ClosureTable + ?Sized,
        I: IntoIterator<Item = (NodeId, NodeId)>,
    {
        table.clear()?;
        for (parent, child) in pairs {
            match self.on_insert(table, parent, child)? {
                InsertOutcome::Propagated { .. } | InsertOutcome::AlreadyTracked { .. } => {}
                InsertOutcome::SkippedCycle => {
                    return Err(StorageError::Inconsistent {
                        reason: format!(
                            "closure-eligible links contain a cycle through {} -> {}",
                            parent, child
                        ),
                    });
                }
                InsertOutcome::SkippedSelfLoop => {
                    return Err(StorageError::Inconsistent {
                        reason: format!("closure-eligible self-loop on node {}", parent),
                    });
                }
            }
        }
        let rows = table.row_count()?;
        tracing::info!(rows, "rebuilt transitive closure");
        Ok(rows)
    }
}

/// Validates a link before it reaches any store.
///
/// A closure-eligible self-loop is reported as an integrity error; other
/// validation failures pass through as [`StorageError::Core`].
pub(crate) fn validate_link(link: &Link) -> Result<(), StorageError> {
    match link.validate() {
        Ok(()) => Ok(()),
        Err(CoreError::SelfLoop { node }) => Err(StorageError::IntegrityError {
            reason: format!("self-loop on node {}", node),
        }),
        Err(e) => Err(e.into()),
    }
}
