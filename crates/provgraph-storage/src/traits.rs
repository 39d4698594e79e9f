//! The [`LinkStore`] trait: the Edge Store contract consumed by callers.
//!
//! Callers only ever insert and delete links. Every mutation keeps the
//! Closure Store in step inside the same transaction, so no reader can see a
//! link without the closure rows it implies (or the reverse).
//!
//! All backends (InMemoryStore, SqliteStore) implement this trait, ensuring
//! they are fully swappable without changing caller logic.

use provgraph_core::{ClosureRow, Link, LinkId, NodeId, StoredLink};

use crate::error::StorageError;
use crate::snapshot::ClosureSnapshot;
use crate::types::StoreStats;
use crate::verify::{verify_closure, ClosureReport};

/// The storage contract for provenance links and their transitive closure.
pub trait LinkStore {
    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    /// Stores a link and propagates it into the closure if it is eligible.
    ///
    /// Fails with [`StorageError::IntegrityError`] for a closure-eligible
    /// self-loop, [`StorageError::DuplicateLink`] when unique links are
    /// configured and the `(input, output, label)` triple exists, and
    /// [`StorageError::Cycle`] when the link would close a cycle under
    /// [`CyclePolicy::Reject`](crate::CyclePolicy::Reject).
    fn insert_link(&mut self, link: &Link) -> Result<LinkId, StorageError>;

    /// Stores several links atomically: either all are stored or none.
    fn insert_links(&mut self, links: &[Link]) -> Result<Vec<LinkId>, StorageError>;

    /// Deletes a link and every closure row that depended on it.
    fn delete_link(&mut self, id: LinkId) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Link queries
    // -------------------------------------------------------------------

    fn get_link(&self, id: LinkId) -> Result<StoredLink, StorageError>;

    /// All links in id order.
    fn list_links(&self) -> Result<Vec<StoredLink>, StorageError>;

    /// Links leaving `node`, in id order.
    fn links_from(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError>;

    /// Links entering `node`, in id order.
    fn links_to(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError>;

    // -------------------------------------------------------------------
    // Closure queries
    // -------------------------------------------------------------------

    /// Whether `ancestor` reaches `descendant` through closure-eligible links.
    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, StorageError>;

    /// Distinct ancestors of `node`, sorted, optionally limited to routes of
    /// at most `max_depth` (closure depth, so 0 means direct inputs).
    fn ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError>;

    /// Distinct descendants of `node`, sorted, with the same depth bound.
    fn descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError>;

    /// Every closure row from `ancestor` to `descendant`, by depth then id.
    fn paths_between(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Vec<ClosureRow>, StorageError>;

    /// Every closure row in id order.
    fn closure_rows(&self) -> Result<Vec<ClosureRow>, StorageError>;

    fn stats(&self) -> Result<StoreStats, StorageError>;

    // -------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------

    /// Recomputes the whole closure from the stored closure-eligible links.
    ///
    /// Returns the number of closure rows afterwards.
    fn rebuild_closure(&mut self) -> Result<usize, StorageError>;

    /// Checks every closure invariant against the stored links.
    fn verify_closure(&self) -> Result<ClosureReport, StorageError> {
        verify_closure(self)
    }

    /// Captures the Closure Store for later comparison.
    fn snapshot(&self) -> Result<ClosureSnapshot, StorageError> {
        Ok(ClosureSnapshot::from_rows(self.closure_rows()?))
    }
}
