//! SQLite implementation of [`LinkStore`].
//!
//! [`SqliteStore`] persists links and their closure in a SQLite database with
//! WAL mode and automatic schema migrations. Every mutation runs in one
//! `BEGIN IMMEDIATE` transaction covering both the link row and all closure
//! rows it implies, retried when another writer holds the lock.

use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};

use provgraph_core::{
    ClosureRow, Link, LinkId, LinkType, NewClosureRow, NodeId, PathId, StoredLink,
};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::maintainer::{validate_link, ClosureMaintainer};
use crate::table::ClosureTable;
use crate::traits::LinkStore;
use crate::types::StoreStats;

/// Upper bound on ids bound into one `IN (...)` list.
const IN_CHUNK: usize = 300;

const CLOSURE_COLUMNS: &str =
    "id, parent_id, child_id, depth, entry_edge_id, direct_edge_id, exit_edge_id";

const LINK_COLUMNS: &str = "id, input_id, output_id, label, link_type, include_in_closure";

/// SQLite-backed implementation of [`LinkStore`].
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
    maintainer: ClosureMaintainer,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path` with default settings.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        Self::with_config(path, StoreConfig::default())
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::in_memory_with_config(StoreConfig::default())
    }

    pub fn with_config(path: &str, config: StoreConfig) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path, &config)?;
        tracing::info!(path, cycle_policy = ?config.cycle_policy, "opened sqlite store");
        Ok(SqliteStore {
            conn,
            config,
            maintainer: ClosureMaintainer::new(),
        })
    }

    pub fn in_memory_with_config(config: StoreConfig) -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory(&config)?;
        Ok(SqliteStore {
            conn,
            config,
            maintainer: ClosureMaintainer::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Runs `f` in an immediate transaction, retrying on lock contention.
    fn write<T, F>(&mut self, op: &'static str, mut f: F) -> Result<T, StorageError>
    where
        F: FnMut(&Transaction<'_>, &StoreConfig) -> Result<T, StorageError>,
    {
        let mut attempt = 0u32;
        loop {
            match run_immediate(&mut self.conn, &self.config, &mut f) {
                Err(e) if e.is_busy() && attempt < self.config.busy_retries => {
                    attempt += 1;
                    tracing::warn!(op, attempt, "database busy, retrying write");
                }
                result => return result,
            }
        }
    }

    fn query_links(&self, filter: &str, node: Option<NodeId>) -> Result<Vec<StoredLink>, StorageError> {
        let sql = format!("SELECT {} FROM links {} ORDER BY id", LINK_COLUMNS, filter);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let raw = match node {
            Some(node) => stmt
                .query_map(params![node.0], read_link_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], read_link_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        raw.into_iter().map(RawLink::into_stored).collect()
    }

    fn related_nodes(
        &self,
        select: &str,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError> {
        let mut stmt = self.conn.prepare_cached(select)?;
        let nodes = stmt
            .query_map(params![node.0, max_depth], |row| Ok(NodeId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }
}

fn run_immediate<T, F>(
    conn: &mut Connection,
    config: &StoreConfig,
    f: &mut F,
) -> Result<T, StorageError>
where
    F: FnMut(&Transaction<'_>, &StoreConfig) -> Result<T, StorageError>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx, config)?;
    tx.commit()?;
    Ok(value)
}

/// Stores one link and propagates it, inside the caller's transaction.
fn insert_in_tx(
    tx: &Transaction<'_>,
    config: &StoreConfig,
    maintainer: ClosureMaintainer,
    link: &Link,
) -> Result<LinkId, StorageError> {
    validate_link(link)?;

    if config.unique_links {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM links WHERE input_id = ?1 AND output_id = ?2 AND label = ?3)",
            params![link.input.0, link.output.0, link.label],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StorageError::DuplicateLink {
                input: link.input,
                output: link.output,
                label: link.label.clone(),
            });
        }
    }

    let mut table = SqlClosureTable::new(tx);
    let mut link = link.clone();
    maintainer.admit(&table, &mut link, config.cycle_policy)?;

    tx.prepare_cached(
        "INSERT INTO links (input_id, output_id, label, link_type, include_in_closure) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        link.input.0,
        link.output.0,
        link.label,
        link.link_type.as_str(),
        link.include_in_closure,
    ])?;
    let id = LinkId(tx.last_insert_rowid());

    let rows_added = if link.include_in_closure {
        maintainer
            .on_insert(&mut table, link.input, link.output)?
            .rows_added()
    } else {
        0
    };
    tracing::debug!(
        link = id.0,
        input = link.input.0,
        output = link.output.0,
        rows_added,
        "stored link"
    );
    Ok(id)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RawLink {
    id: i64,
    input: i64,
    output: i64,
    label: String,
    link_type: String,
    include_in_closure: bool,
}

impl RawLink {
    fn into_stored(self) -> Result<StoredLink, StorageError> {
        let link_type: LinkType = self.link_type.parse()?;
        Ok(StoredLink {
            id: LinkId(self.id),
            link: Link {
                input: NodeId(self.input),
                output: NodeId(self.output),
                label: self.label,
                link_type,
                include_in_closure: self.include_in_closure,
            },
        })
    }
}

fn read_link_row(row: &Row<'_>) -> rusqlite::Result<RawLink> {
    Ok(RawLink {
        id: row.get(0)?,
        input: row.get(1)?,
        output: row.get(2)?,
        label: row.get(3)?,
        link_type: row.get(4)?,
        include_in_closure: row.get(5)?,
    })
}

fn read_closure_row(row: &Row<'_>) -> rusqlite::Result<ClosureRow> {
    Ok(ClosureRow {
        id: PathId(row.get(0)?),
        parent: NodeId(row.get(1)?),
        child: NodeId(row.get(2)?),
        depth: row.get(3)?,
        entry_edge_id: PathId(row.get(4)?),
        direct_edge_id: PathId(row.get(5)?),
        exit_edge_id: PathId(row.get(6)?),
    })
}

fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// SqlClosureTable
// ---------------------------------------------------------------------------

/// [`ClosureTable`] over the `closure_paths` table of one connection.
///
/// Borrowing a [`Transaction`] (which derefs to [`Connection`]) keeps every
/// propagator step inside the caller's transaction.
pub struct SqlClosureTable<'c> {
    conn: &'c Connection,
}

impl<'c> SqlClosureTable<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqlClosureTable { conn }
    }

    fn rows_where(&self, column: &str, node: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM closure_paths WHERE {} = ?1 ORDER BY id",
            CLOSURE_COLUMNS, column
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![node.0], read_closure_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ClosureTable for SqlClosureTable<'_> {
    fn direct_row(&self, parent: NodeId, child: NodeId) -> Result<Option<PathId>, StorageError> {
        let id = self
            .conn
            .prepare_cached(
                "SELECT id FROM closure_paths WHERE parent_id = ?1 AND child_id = ?2 AND depth = 0",
            )?
            .query_row(params![parent.0, child.0], |row| row.get(0))
            .optional()?;
        Ok(id.map(PathId))
    }

    fn path_exists(&self, parent: NodeId, child: NodeId) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .prepare_cached(
                "SELECT EXISTS(SELECT 1 FROM closure_paths WHERE parent_id = ?1 AND child_id = ?2)",
            )?
            .query_row(params![parent.0, child.0], |row| row.get(0))?;
        Ok(exists)
    }

    fn rows_ending_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
        self.rows_where("child_id", node)
    }

    fn rows_starting_at(&self, node: NodeId) -> Result<Vec<ClosureRow>, StorageError> {
        self.rows_where("parent_id", node)
    }

    fn rows_referencing(&self, ids: &[PathId]) -> Result<Vec<PathId>, StorageError> {
        let mut out = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let marks = placeholders(chunk.len());
            let sql = format!(
                "SELECT id FROM closure_paths \
                 WHERE entry_edge_id IN ({m}) OR direct_edge_id IN ({m}) OR exit_edge_id IN ({m})",
                m = marks
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                    Ok(PathId(row.get(0)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(found);
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn insert_direct(&mut self, parent: NodeId, child: NodeId) -> Result<PathId, StorageError> {
        // The row's own id is only known after the insert.
        self.conn
            .prepare_cached(
                "INSERT INTO closure_paths \
                 (parent_id, child_id, depth, entry_edge_id, direct_edge_id, exit_edge_id) \
                 VALUES (?1, ?2, 0, 0, 0, 0)",
            )?
            .execute(params![parent.0, child.0])?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .prepare_cached(
                "UPDATE closure_paths \
                 SET entry_edge_id = ?1, direct_edge_id = ?1, exit_edge_id = ?1 WHERE id = ?1",
            )?
            .execute(params![id])?;
        Ok(PathId(id))
    }

    fn insert_row(&mut self, row: NewClosureRow) -> Result<PathId, StorageError> {
        let mut parts = vec![row.entry_edge_id, row.direct_edge_id, row.exit_edge_id];
        parts.sort();
        parts.dedup();
        let found: i64 = self
            .conn
            .prepare_cached("SELECT COUNT(*) FROM closure_paths WHERE id IN (?1, ?2, ?3)")?
            .query_row(
                params![row.entry_edge_id.0, row.direct_edge_id.0, row.exit_edge_id.0],
                |r| r.get(0),
            )?;
        if found as usize != parts.len() {
            return Err(StorageError::Inconsistent {
                reason: format!(
                    "row {} -> {} references a missing row among {:?}",
                    row.parent, row.child, parts
                ),
            });
        }

        self.conn
            .prepare_cached(
                "INSERT INTO closure_paths \
                 (parent_id, child_id, depth, entry_edge_id, direct_edge_id, exit_edge_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                row.parent.0,
                row.child.0,
                row.depth,
                row.entry_edge_id.0,
                row.direct_edge_id.0,
                row.exit_edge_id.0,
            ])?;
        Ok(PathId(self.conn.last_insert_rowid()))
    }

    fn delete_rows(&mut self, ids: &[PathId]) -> Result<usize, StorageError> {
        let mut removed = 0;
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "DELETE FROM closure_paths WHERE id IN ({})",
                placeholders(chunk.len())
            );
            removed += self
                .conn
                .execute(&sql, params_from_iter(chunk.iter().map(|id| id.0)))?;
        }
        Ok(removed)
    }

    fn row_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM closure_paths", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        // AUTOINCREMENT keeps the id sequence across the delete.
        self.conn.execute("DELETE FROM closure_paths", [])?;
        Ok(())
    }

    /// Set-based cascade: grows `closure_purge` with one statement per round
    /// until a round adds nothing, then deletes the whole set at once.
    fn purge_dependents(&mut self, seed: PathId) -> Result<Vec<PathId>, StorageError> {
        let bound = self.row_count()?;
        self.conn.execute("DELETE FROM closure_purge", [])?;
        self.conn.execute(
            "INSERT INTO closure_purge (path_id) VALUES (?1)",
            params![seed.0],
        )?;

        let mut grow = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO closure_purge (path_id) \
             SELECT id FROM closure_paths \
             WHERE entry_edge_id IN (SELECT path_id FROM closure_purge) \
                OR direct_edge_id IN (SELECT path_id FROM closure_purge) \
                OR exit_edge_id IN (SELECT path_id FROM closure_purge)",
        )?;
        let mut rounds = 0usize;
        while grow.execute([])? > 0 {
            rounds += 1;
            if rounds > bound + 1 {
                return Err(StorageError::Inconsistent {
                    reason: format!(
                        "purge cascade from row {} did not reach a fixed point after {} rounds",
                        seed, rounds
                    ),
                });
            }
        }

        let ids = self
            .conn
            .prepare_cached("SELECT path_id FROM closure_purge ORDER BY path_id")?
            .query_map([], |row| Ok(PathId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let removed = self.conn.execute(
            "DELETE FROM closure_paths WHERE id IN (SELECT path_id FROM closure_purge)",
            [],
        )?;
        self.conn.execute("DELETE FROM closure_purge", [])?;

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

// ---------------------------------------------------------------------------
// LinkStore
// ---------------------------------------------------------------------------

impl LinkStore for SqliteStore {
    fn insert_link(&mut self, link: &Link) -> Result<LinkId, StorageError> {
        let maintainer = self.maintainer;
        self.write("insert_link", |tx, config| {
            insert_in_tx(tx, config, maintainer, link)
        })
    }

    fn insert_links(&mut self, links: &[Link]) -> Result<Vec<LinkId>, StorageError> {
        let maintainer = self.maintainer;
        let ids = self.write("insert_links", |tx, config| {
            links
                .iter()
                .map(|link| insert_in_tx(tx, config, maintainer, link))
                .collect::<Result<Vec<_>, _>>()
        })?;
        tracing::info!(links = ids.len(), "stored link batch");
        Ok(ids)
    }

    fn delete_link(&mut self, id: LinkId) -> Result<(), StorageError> {
        let maintainer = self.maintainer;
        self.write("delete_link", |tx, _config| {
            let sql = format!("SELECT {} FROM links WHERE id = ?1", LINK_COLUMNS);
            let raw = tx
                .prepare_cached(&sql)?
                .query_row(params![id.0], read_link_row)
                .optional()?
                .ok_or(StorageError::LinkNotFound(id.0))?;
            let stored = raw.into_stored()?;
            let link = &stored.link;

            tx.execute("DELETE FROM links WHERE id = ?1", params![id.0])?;
            if !link.include_in_closure {
                return Ok(());
            }

            let sibling: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM links \
                 WHERE input_id = ?1 AND output_id = ?2 AND include_in_closure = 1)",
                params![link.input.0, link.output.0],
                |row| row.get(0),
            )?;
            if sibling {
                tracing::debug!(
                    link = id.0,
                    "another eligible link keeps the pair in the closure"
                );
                return Ok(());
            }

            let mut table = SqlClosureTable::new(tx);
            maintainer.on_delete(&mut table, link.input, link.output)?;
            Ok(())
        })
    }

    fn get_link(&self, id: LinkId) -> Result<StoredLink, StorageError> {
        let sql = format!("SELECT {} FROM links WHERE id = ?1", LINK_COLUMNS);
        self.conn
            .prepare_cached(&sql)?
            .query_row(params![id.0], read_link_row)
            .optional()?
            .ok_or(StorageError::LinkNotFound(id.0))?
            .into_stored()
    }

    fn list_links(&self) -> Result<Vec<StoredLink>, StorageError> {
        self.query_links("", None)
    }

    fn links_from(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError> {
        self.query_links("WHERE input_id = ?1", Some(node))
    }

    fn links_to(&self, node: NodeId) -> Result<Vec<StoredLink>, StorageError> {
        self.query_links("WHERE output_id = ?1", Some(node))
    }

    fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, StorageError> {
        SqlClosureTable::new(&self.conn).path_exists(ancestor, descendant)
    }

    fn ancestors(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError> {
        self.related_nodes(
            "SELECT DISTINCT parent_id FROM closure_paths \
             WHERE child_id = ?1 AND (?2 IS NULL OR depth <= ?2) ORDER BY parent_id",
            node,
            max_depth,
        )
    }

    fn descendants(
        &self,
        node: NodeId,
        max_depth: Option<u32>,
    ) -> Result<Vec<NodeId>, StorageError> {
        self.related_nodes(
            "SELECT DISTINCT child_id FROM closure_paths \
             WHERE parent_id = ?1 AND (?2 IS NULL OR depth <= ?2) ORDER BY child_id",
            node,
            max_depth,
        )
    }

    fn paths_between(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<Vec<ClosureRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM closure_paths WHERE parent_id = ?1 AND child_id = ?2 ORDER BY depth, id",
            CLOSURE_COLUMNS
        );
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .query_map(params![ancestor.0, descendant.0], read_closure_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn closure_rows(&self) -> Result<Vec<ClosureRow>, StorageError> {
        let sql = format!("SELECT {} FROM closure_paths ORDER BY id", CLOSURE_COLUMNS);
        let rows = self
            .conn
            .prepare_cached(&sql)?
            .query_map([], read_closure_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let (links, closure_links): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(include_in_closure), 0) FROM links",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (closure_rows, direct_rows, max_depth): (i64, i64, Option<u32>) =
            self.conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(depth = 0), 0), MAX(depth) FROM closure_paths",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        Ok(StoreStats {
            links: links as usize,
            closure_links: closure_links as usize,
            closure_rows: closure_rows as usize,
            direct_rows: direct_rows as usize,
            max_depth,
        })
    }

    fn rebuild_closure(&mut self) -> Result<usize, StorageError> {
        let maintainer = self.maintainer;
        self.write("rebuild_closure", |tx, _config| {
            let pairs = tx
                .prepare_cached(
                    "SELECT input_id, output_id FROM links WHERE include_in_closure = 1 \
                     GROUP BY input_id, output_id ORDER BY MIN(id)",
                )?
                .query_map([], |row| Ok((NodeId(row.get(0)?), NodeId(row.get(1)?))))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut table = SqlClosureTable::new(tx);
            maintainer.rebuild(&mut table, pairs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CyclePolicy;
    use crate::purge::PurgeList;

    fn n(id: i64) -> NodeId {
        NodeId(id)
    }

    fn input(a: i64, b: i64) -> Link {
        Link::new(n(a), n(b), "in", LinkType::Input)
    }

    fn triples(store: &SqliteStore) -> Vec<(i64, i64, u32)> {
        let mut out: Vec<_> = store
            .closure_rows()
            .unwrap()
            .iter()
            .map(|r| (r.parent.0, r.child.0, r.depth))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn chain_insert_and_delete() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        let mid = store.insert_link(&input(2, 3)).unwrap();
        store.insert_link(&input(3, 4)).unwrap();
        assert_eq!(store.closure_rows().unwrap().len(), 6);
        assert!(store.is_ancestor(n(1), n(4)).unwrap());

        store.delete_link(mid).unwrap();
        assert_eq!(triples(&store), vec![(1, 2, 0), (3, 4, 0)]);
        assert!(store.verify_closure().unwrap().is_consistent());
    }

    #[test]
    fn direct_rows_reference_themselves() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        let row = store.closure_rows().unwrap()[0];
        assert_eq!(row.entry_edge_id, row.id);
        assert_eq!(row.direct_edge_id, row.id);
        assert_eq!(row.exit_edge_id, row.id);
    }

    #[test]
    fn rejected_cycle_leaves_both_tables_unchanged() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        store.insert_link(&input(2, 3)).unwrap();
        let before = store.snapshot().unwrap();

        let err = store.insert_link(&input(3, 1)).unwrap_err();
        assert!(matches!(err, StorageError::Cycle { .. }));
        assert_eq!(store.list_links().unwrap().len(), 2);
        assert!(before.diff(&store.snapshot().unwrap()).is_empty());

        // The failed attempt must not consume a link id.
        assert_eq!(store.insert_link(&input(3, 4)).unwrap(), LinkId(3));
    }

    #[test]
    fn untrack_policy_stores_link_outside_closure() {
        let config = StoreConfig {
            cycle_policy: CyclePolicy::Untrack,
            ..StoreConfig::default()
        };
        let mut store = SqliteStore::in_memory_with_config(config).unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        let back = store.insert_link(&input(2, 1)).unwrap();
        assert!(!store.get_link(back).unwrap().link.include_in_closure);
        assert_eq!(store.closure_rows().unwrap().len(), 1);
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let mut store = SqliteStore::in_memory().unwrap();
        let err = store
            .insert_links(&[input(1, 2), input(2, 3), input(3, 1)])
            .unwrap_err();
        assert!(matches!(err, StorageError::Cycle { .. }));
        assert!(store.list_links().unwrap().is_empty());
        assert!(store.closure_rows().unwrap().is_empty());
    }

    #[test]
    fn sibling_link_keeps_pair_tracked() {
        let mut store = SqliteStore::in_memory().unwrap();
        let a = store.insert_link(&input(1, 2)).unwrap();
        store
            .insert_link(&Link::new(n(1), n(2), "other", LinkType::Input))
            .unwrap();
        assert_eq!(store.stats().unwrap().direct_rows, 1);

        store.delete_link(a).unwrap();
        assert!(store.is_ancestor(n(1), n(2)).unwrap());
        assert!(store.verify_closure().unwrap().is_consistent());
    }

    #[test]
    fn unique_links_rejects_repeated_label() {
        let config = StoreConfig {
            unique_links: true,
            ..StoreConfig::default()
        };
        let mut store = SqliteStore::in_memory_with_config(config).unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        let err = store.insert_link(&input(1, 2)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateLink { .. }));
    }

    #[test]
    fn missing_link_is_reported() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.delete_link(LinkId(42)),
            Err(StorageError::LinkNotFound(42))
        ));
        assert!(matches!(
            store.get_link(LinkId(42)),
            Err(StorageError::LinkNotFound(42))
        ));
    }

    #[test]
    fn depth_bounded_queries() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .insert_links(&[input(1, 2), input(2, 3), input(3, 4)])
            .unwrap();
        assert_eq!(store.ancestors(n(4), None).unwrap(), vec![n(1), n(2), n(3)]);
        assert_eq!(store.ancestors(n(4), Some(0)).unwrap(), vec![n(3)]);
        assert_eq!(store.descendants(n(1), Some(1)).unwrap(), vec![n(2), n(3)]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.links, 3);
        assert_eq!(stats.closure_rows, 6);
        assert_eq!(stats.direct_rows, 3);
        assert_eq!(stats.max_depth, Some(2));
    }

    #[test]
    fn rebuild_reproduces_incremental_closure() {
        let mut store = SqliteStore::in_memory().unwrap();
        store
            .insert_links(&[input(1, 2), input(3, 4), input(2, 3), input(1, 3)])
            .unwrap();
        let before = store.snapshot().unwrap();
        let rows = store.rebuild_closure().unwrap();
        let after = store.snapshot().unwrap();
        assert_eq!(rows, before.len());
        assert_eq!(before.fingerprint(), after.fingerprint());
        assert!(store.verify_closure().unwrap().is_consistent());
    }

    #[test]
    fn wide_cascade_spans_several_lookup_chunks() {
        let mut store = SqliteStore::in_memory().unwrap();
        let mut links = vec![input(1, 2)];
        links.extend((3..=351).map(|k| input(2, k)));
        store.insert_links(&links).unwrap();

        let tx = store.conn.transaction().unwrap();
        let seed = SqlClosureTable::new(&tx)
            .direct_row(n(1), n(2))
            .unwrap()
            .unwrap();
        let bound = SqlClosureTable::new(&tx).row_count().unwrap();
        let mut queued = PurgeList::collect(&SqlClosureTable::new(&tx), seed, bound)
            .unwrap()
            .into_ids();
        assert_eq!(queued.len(), 350);
        assert!(queued.len() > IN_CHUNK);

        let purged = SqlClosureTable::new(&tx).purge_dependents(seed).unwrap();
        queued.sort();
        assert_eq!(queued, purged);
        assert_eq!(SqlClosureTable::new(&tx).row_count().unwrap(), bound - 350);
    }

    #[test]
    fn failed_purge_rolls_back_the_delete() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_link(&input(1, 2)).unwrap();
        let mid = store.insert_link(&input(2, 3)).unwrap();
        store.insert_link(&input(3, 4)).unwrap();
        let before = store.snapshot().unwrap();

        // Every scheduled id drags in an id no closure row has, so fewer rows
        // are removed than were scheduled.
        store
            .conn
            .execute_batch(
                "CREATE TEMP TRIGGER phantom_purge AFTER INSERT ON closure_purge \
                 BEGIN INSERT OR IGNORE INTO closure_purge (path_id) VALUES (NEW.path_id + 1000000); END;",
            )
            .unwrap();
        let err = store.delete_link(mid).unwrap_err();
        assert!(matches!(err, StorageError::Inconsistent { .. }), "{:?}", err);

        assert_eq!(store.list_links().unwrap().len(), 3);
        assert!(before.diff(&store.snapshot().unwrap()).is_empty());

        store.conn.execute_batch("DROP TRIGGER phantom_purge").unwrap();
        store.delete_link(mid).unwrap();
        assert!(store.verify_closure().unwrap().is_consistent());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closure.db");
        let path = path.to_str().unwrap();
        {
            let mut store = SqliteStore::new(path).unwrap();
            store.insert_links(&[input(1, 2), input(2, 3)]).unwrap();
        }
        let store = SqliteStore::new(path).unwrap();
        assert_eq!(store.list_links().unwrap().len(), 2);
        assert!(store.is_ancestor(n(1), n(3)).unwrap());
    }

    #[test]
    fn held_write_lock_surfaces_busy_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.db");
        let path = path.to_str().unwrap();
        let config = StoreConfig {
            busy_timeout_ms: 0,
            busy_retries: 0,
            ..StoreConfig::default()
        };
        let mut store = SqliteStore::with_config(path, config).unwrap();

        let other = Connection::open(path).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();
        let err = store.insert_link(&input(1, 2)).unwrap_err();
        assert!(err.is_busy(), "{:?}", err);
        other.execute_batch("ROLLBACK").unwrap();

        store.insert_link(&input(1, 2)).unwrap();
    }
}
