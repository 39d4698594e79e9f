//! In-memory implementation of [`LinkStore`].
//!
//! Links live in a `BTreeMap` keyed by id and the closure in a
//! [`ClosureArena`]. Every mutation runs under the arena's undo journal:
//! when any step fails, new links are dropped, the link id counter is reset
//! and the arena rolls back, so the store is left as it was.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;

use provgraph_core::{ClosureRow, Link, LinkId, NodeId, StoredLink};

use crate::arena::ClosureArena;
use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::maintainer::{validate_link, ClosureMaintainer};
use crate::table::ClosureTable;
use crate::traits::LinkStore;
use crate::types::StoreStats;

/// In-memory implementation of [`LinkStore`].
///
/// Allocates link and closure row ids exactly as [`SqliteStore`](crate::SqliteStore)
/// does, so the two can be compared row for row.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    config: StoreConfig,
    links: BTreeMap<LinkId, Link>,
    next_link_id: i64,
    closure: ClosureArena,
    maintainer: ClosureMaintainer,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        InMemoryStore {
            config,
            links: BTreeMap::new(),
            next_link_id: 1,
            closure: ClosureArena::new(),
            maintainer: ClosureMaintainer::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The closure arena, for inspection.
    pub fn closure(&self) -> &ClosureArena {
        &self.closure
    }

    fn insert_one(&mut self, link: &Link) -> Result<LinkId, StorageError> {
        validate_link(link)?;

        if self.config.unique_links
            && self.links.values().any(|l| {
                l.input == link.input && l.output == link.output && l.label == link.label
            })
        {
            return Err(StorageError::DuplicateLink {
                input: link.input,
                output: link.output,
                label: link.label.clone(),
            });
        }

        let mut link = link.clone();
        self.maintainer
            .admit(&self.closure, &mut link, self.config.cycle_policy)?;

        let rows_added = if link.include_in_closure {
            self.maintainer
                .on_insert(&mut self.closure, link.input, link.output)?
                .rows_added()
        } else {
            0
        };

        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        tracing::debug!(
            link = id.0,
            input = link.input.0,
            output = link.output.0,
            rows_added,
            "stored link"
        );
        self.links.insert(id, link);
        Ok(id)
    }

    /// Runs `op` as one all-or-nothing mutation.
    fn atomically<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let next_link_id = self.next_link_id;
        self.closure.begin();
        match op(self) {
            Ok(value) => {
                self.closure.commit();
                Ok(value)
            }
            Err(e) => {
                self.closure.rollback();
                self.links.retain(|id, _| id.0 < next_link_id);
                self.next_link_id = next_link_id;
                Err(e)
            }
        }
    }

    fn stored(&self, id: LinkId, link: &Link) -> StoredLink {
        StoredLink {
            id,
            link: link.clone(),
        }
    }

    fn filtered_links(&self, keep: impl Fn(&Link) -> bool) -> Vec<StoredLink> {
        self.links
            .iter()
            .filter(|(_, link)| keep(link))
            .map(|(id, link)| self.stored(*id, link))
            .collect()
    }

    fn bounded(depth: u32, max_depth: Option<u32>) -> bool {
        max_depth.map_or(true, |max| depth <= max)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStore for InMemoryStore {
    // -------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------

    fn insert_link(&mut self, link: &Link) -> Result<LinkId, StorageError> {
        self.atomically(|store| store.insert_one(link))
    }

    fn insert_links(&mut self, links: &[Link]) -> Result<Vec<LinkId>, StorageError> {
        let ids = self.atomically(|store| {
            links
                .iter()
                .map(|link| store.insert_one(link))
                .collect::<Result<Vec<_>, _>>()
        })?;
        tracing::info!(links = ids.len(), "stored link batch");
        Ok(ids)
    }

    fn delete_link(&mut self, id: LinkId) -> Result<(), StorageError> {
        self.atomically(|store| {
            let link = store
                .links
                .get(&id)
                .cloned()
                .ok_or(StorageError::LinkNotFound(id.0))?;

            if link.include_in_closure {
                let sibling = store.links.iter().any(|(other, l)| {
                    *other != id
                        && l.include_in_closure
                        && l.input == link.input
                        && l.output == link.output
                });
                if sibling {
                    tracing::debug!(
                        link = id.0,
                        "another eligible link keeps the pair in the closure"
                    );
                } else {
                    store
                        .maintainer
                        .on_delete(&mut store.closure, link.input, link.output)?;
                }
            }

            store.links.remove(&id);
            Ok(())
        })
    }

    // -------------------------------------------------------------------
    // Link queries
    // -------------------------------------------------------------------

    fn get_link(&self, id: LinkId) -> Result<StoredLink, StorageError> {
        self.links
            .get(&id)
            .map(|link| self.stored(id, link))
            .ok_or(StorageError::LinkNotFound(id.0))
    }

    fn list_links(&self) -> Result<Vec<StoredLink>, StorageError> {
        Ok(self.filtered_links(|_| true))
    }

    fn links_from(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError> {
        Ok(self.filtered_links(|l| l.input == node))
    }

    fn links_to(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError> {
        Ok(self.filtered_links(|l| l.output == node))
    }

    // -------------------------------------------------------------------
    // Closure queries
    // -------------------------------------------------------------------

    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, StorageError> {
        self.closure.path_exists(ancestor, descendant)
    }

    fn ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError> {
        let nodes: BTreeSet<NodeId> = self
            .closure
            .rows_ending_at(node)?
            .into_iter()
            .filter(|r| Self::bounded(r.depth, max_depth))
            .map(|r| r.parent)
            .collect();
        Ok(nodes.into_iter().collect())
    }

    fn descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError> {
        let nodes: BTreeSet<NodeId> = self
            .closure
            .rows_starting_at(node)?
            .into_iter()
            .filter(|r| Self::bounded(r.depth, max_depth))
            .map(|r| r.child)
            .collect();
        Ok(nodes.into_iter().collect())
    }

    fn paths_between(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Vec<ClosureRow>, StorageError> {
        let mut rows: Vec<ClosureRow> = self
            .closure
            .rows_starting_at(ancestor)?
            .into_iter()
            .filter(|r| r.child == descendant)
            .collect();
        rows.sort_by_key(|r| (r.depth, r.id));
        Ok(rows)
    }

    fn closure_rows(&self) -> Result<Vec<ClosureRow>, StorageError> {
        Ok(self.closure.rows().copied().collect())
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        Ok(StoreStats {
            links: self.links.len(),
            closure_links: self.links.values().filter(|l| l.include_in_closure).count(),
            closure_rows: self.closure.len(),
            direct_rows: self.closure.rows().filter(|r| r.is_direct()).count(),
            max_depth: self.closure.rows().map(|r| r.depth).max(),
        })
    }

    // -------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------

    fn rebuild_closure(&mut self) -> Result<usize, StorageError> {
        let pairs: IndexSet<(NodeId, NodeId)> = self
            .links
            .values()
            .filter(|l| l.include_in_closure)
            .map(|l| (l.input, l.output))
            .collect();

        self.atomically(|store| store.maintainer.rebuild(&mut store.closure, pairs))
    }
}
