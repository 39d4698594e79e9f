//! Exhaustive closure verification.
//!
//! [`check_closure`] compares a set of closure rows against the links they
//! were derived from and reports every violated invariant:
//!
//! - no row connects a node to itself,
//! - depth-0 rows correspond one-to-one with distinct closure-eligible
//!   `(input, output)` pairs and reference only themselves,
//! - every entry/direct/exit id of a deeper row resolves, the direct part is
//!   a depth-0 row, the parts chain end to end from `parent` to `child`, and
//!   their depths add up to the row's depth,
//! - the multiset of `(parent, child, depth)` equals the multiset of routes
//!   in the graph of closure-eligible links.
//!
//! The last check recomputes routes independently with `petgraph`, so it
//! catches both missing and surplus rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

use provgraph_core::{ClosureRow, NodeId, PathId, StoredLink};

use crate::error::StorageError;
use crate::traits::LinkStore;

/// Outcome of a verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClosureReport {
    pub links_checked: usize,
    pub rows_checked: usize,
    pub violations: Vec<String>,
}

impl ClosureReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// Turns a report with violations into [`StorageError::Inconsistent`].
    pub fn into_result(self) -> Result<Self, StorageError> {
        if self.is_consistent() {
            return Ok(self);
        }
        Err(StorageError::Inconsistent {
            reason: format!(
                "{} violation(s), first: {}",
                self.violations.len(),
                self.violations[0]
            ),
        })
    }
}

/// Loads links and closure rows from `store` and checks them.
pub fn verify_closure<S: LinkStore + ?Sized>(store: &S) -> Result<ClosureReport, StorageError> {
    let links = store.list_links()?;
    let rows = store.closure_rows()?;
    Ok(check_closure(&links, &rows))
}

/// Checks `rows` against `links` without touching any store.
pub fn check_closure(links: &[StoredLink], rows: &[ClosureRow]) -> ClosureReport {
    let mut report = ClosureReport {
        links_checked: links.len(),
        rows_checked: rows.len(),
        violations: Vec::new(),
    };

    let by_id: HashMap<PathId, &ClosureRow> = rows.iter().map(|r| (r.id, r)).collect();
    if by_id.len() != rows.len() {
        report.violations.push("closure row ids are not unique".to_string());
    }

    for row in rows {
        check_row(row, &by_id, &mut report.violations);
    }

    let eligible: BTreeSet<(NodeId, NodeId)> = links
        .iter()
        .filter(|l| l.link.include_in_closure)
        .map(|l| (l.link.input, l.link.output))
        .collect();
    check_direct_rows(&eligible, rows, &mut report.violations);
    check_route_multiset(&eligible, rows, &mut report.violations);

    report
}

fn check_row(row: &ClosureRow, by_id: &HashMap<PathId, &ClosureRow>, out: &mut Vec<String>) {
    if row.parent == row.child {
        out.push(format!("row {} is a self-path on node {}", row.id, row.parent));
    }

    if row.is_direct() {
        if row.entry_edge_id != row.id || row.direct_edge_id != row.id || row.exit_edge_id != row.id {
            out.push(format!("depth-0 row {} does not reference itself", row.id));
        }
        return;
    }

    let mut parts = Vec::with_capacity(3);
    for id in row.components() {
        match by_id.get(&id) {
            Some(part) => parts.push(*part),
            None => {
                out.push(format!("row {} references missing row {}", row.id, id));
                return;
            }
        }
    }

    if let Some(direct) = by_id.get(&row.direct_edge_id) {
        if !direct.is_direct() {
            out.push(format!(
                "row {} has direct part {} at depth {}",
                row.id, direct.id, direct.depth
            ));
        }
    }

    let chained = parts.first().map(|p| p.parent) == Some(row.parent)
        && parts.last().map(|p| p.child) == Some(row.child)
        && parts.windows(2).all(|w| w[0].child == w[1].parent);
    if !chained {
        out.push(format!(
            "row {} ({} -> {}) parts do not chain end to end",
            row.id, row.parent, row.child
        ));
    }

    let expected_depth: u32 =
        parts.iter().map(|p| p.depth).sum::<u32>() + parts.len() as u32 - 1;
    if expected_depth != row.depth {
        out.push(format!(
            "row {} has depth {} but its parts add up to {}",
            row.id, row.depth, expected_depth
        ));
    }
}

fn check_direct_rows(
    eligible: &BTreeSet<(NodeId, NodeId)>,
    rows: &[ClosureRow],
    out: &mut Vec<String>,
) {
    let mut direct: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.is_direct()) {
        *direct.entry((row.parent, row.child)).or_default() += 1;
    }
    for (pair, count) in &direct {
        if *count > 1 {
            out.push(format!("{} depth-0 rows for {} -> {}", count, pair.0, pair.1));
        }
        if !eligible.contains(pair) {
            out.push(format!(
                "depth-0 row {} -> {} has no closure-eligible link",
                pair.0, pair.1
            ));
        }
    }
    for pair in eligible {
        if !direct.contains_key(pair) {
            out.push(format!(
                "closure-eligible link {} -> {} has no depth-0 row",
                pair.0, pair.1
            ));
        }
    }
}

fn check_route_multiset(
    eligible: &BTreeSet<(NodeId, NodeId)>,
    rows: &[ClosureRow],
    out: &mut Vec<String>,
) {
    let graph: DiGraphMap<NodeId, ()> = eligible.iter().map(|&(a, b)| (a, b)).collect();
    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            out.push(format!(
                "closure-eligible links contain a cycle through node {}",
                cycle.node_id()
            ));
            return;
        }
    };
    let position: HashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, n)| (*n, i)).collect();

    let mut expected: BTreeMap<(NodeId, NodeId, u32), u64> = BTreeMap::new();
    for (start, &source) in order.iter().enumerate() {
        // Route counts from `source`, keyed by target then closure depth.
        let mut routes: HashMap<NodeId, BTreeMap<u32, u64>> = HashMap::new();
        for next in graph.neighbors(source) {
            *routes.entry(next).or_default().entry(0).or_default() += 1;
        }
        for &node in &order[start + 1..] {
            let Some(counts) = routes.get(&node).cloned() else {
                continue;
            };
            for next in graph.neighbors(node) {
                debug_assert!(position[&next] > position[&node]);
                let target = routes.entry(next).or_default();
                for (depth, count) in &counts {
                    *target.entry(depth + 1).or_default() += count;
                }
            }
            for (depth, count) in counts {
                expected.insert((source, node, depth), count);
            }
        }
    }

    let mut actual: BTreeMap<(NodeId, NodeId, u32), u64> = BTreeMap::new();
    for row in rows {
        *actual.entry((row.parent, row.child, row.depth)).or_default() += 1;
    }

    for (key, want) in &expected {
        let have = actual.get(key).copied().unwrap_or(0);
        if have != *want {
            out.push(format!(
                "{} -> {} at depth {}: expected {} row(s), found {}",
                key.0, key.1, key.2, want, have
            ));
        }
    }
    for (key, have) in &actual {
        if !expected.contains_key(key) {
            out.push(format!(
                "{} -> {} at depth {}: found {} row(s) for a route that does not exist",
                key.0, key.1, key.2, have
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provgraph_core::{Link, LinkId, LinkType};

    fn link(id: i64, input: i64, output: i64) -> StoredLink {
        StoredLink {
            id: LinkId(id),
            link: Link::new(NodeId(input), NodeId(output), "x", LinkType::Input),
        }
    }

    fn row(id: i64, parent: i64, child: i64, depth: u32, parts: (i64, i64, i64)) -> ClosureRow {
        ClosureRow {
            id: PathId(id),
            parent: NodeId(parent),
            child: NodeId(child),
            depth,
            entry_edge_id: PathId(parts.0),
            direct_edge_id: PathId(parts.1),
            exit_edge_id: PathId(parts.2),
        }
    }

    #[test]
    fn consistent_chain_passes() {
        let links = vec![link(1, 1, 2), link(2, 2, 3)];
        let rows = vec![
            row(1, 1, 2, 0, (1, 1, 1)),
            row(2, 2, 3, 0, (2, 2, 2)),
            row(3, 1, 3, 1, (1, 2, 2)),
        ];
        let report = check_closure(&links, &rows);
        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.rows_checked, 3);
    }

    #[test]
    fn missing_transitive_row_is_reported() {
        let links = vec![link(1, 1, 2), link(2, 2, 3)];
        let rows = vec![row(1, 1, 2, 0, (1, 1, 1)), row(2, 2, 3, 0, (2, 2, 2))];
        let report = check_closure(&links, &rows);
        assert!(!report.is_consistent());
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("1 -> 3 at depth 1: expected 1")));
    }

    #[test]
    fn dangling_reference_is_reported() {
        let links = vec![link(1, 1, 2), link(2, 2, 3)];
        let rows = vec![
            row(1, 1, 2, 0, (1, 1, 1)),
            row(2, 2, 3, 0, (2, 2, 2)),
            row(3, 1, 3, 1, (1, 9, 9)),
        ];
        let report = check_closure(&links, &rows);
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("references missing row 9")));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn untracked_links_need_no_rows() {
        let mut back = link(2, 2, 1);
        back.link.include_in_closure = false;
        let links = vec![link(1, 1, 2), back];
        let rows = vec![row(1, 1, 2, 0, (1, 1, 1))];
        assert!(check_closure(&links, &rows).is_consistent());
    }

    #[test]
    fn diamond_expects_two_routes() {
        let links = vec![link(1, 1, 2), link(2, 1, 3), link(3, 2, 4), link(4, 3, 4)];
        let rows = vec![
            row(1, 1, 2, 0, (1, 1, 1)),
            row(2, 1, 3, 0, (2, 2, 2)),
            row(3, 2, 4, 0, (3, 3, 3)),
            row(4, 1, 4, 1, (1, 3, 3)),
        ];
        let report = check_closure(&links, &rows);
        assert!(report
            .violations
            .iter()
            .any(|v| v.contains("1 -> 4 at depth 1: expected 2 row(s), found 1")));
    }

    #[test]
    fn eligible_cycle_is_reported() {
        let links = vec![link(1, 1, 2), link(2, 2, 1)];
        let report = check_closure(&links, &[]);
        assert!(report.violations.iter().any(|v| v.contains("cycle")));
    }
}
