//! End-to-end closure maintenance through the `LinkStore` API, run against
//! both backends.

use provgraph_core::{ClosureRow, Link, LinkId, LinkType, NodeId};
use provgraph_storage::{
    ClosureSnapshot, CyclePolicy, InMemoryStore, LinkStore, SqliteStore, StorageError,
    StoreConfig,
};

const A: NodeId = NodeId(1);
const B: NodeId = NodeId(2);
const C: NodeId = NodeId(3);
const D: NodeId = NodeId(4);
const X: NodeId = NodeId(10);
const Y: NodeId = NodeId(11);
const Z: NodeId = NodeId(12);

fn backends(config: StoreConfig) -> Vec<(&'static str, Box<dyn LinkStore>)> {
    let memory: Box<dyn LinkStore> = Box::new(InMemoryStore::with_config(config.clone()));
    let sqlite: Box<dyn LinkStore> = Box::new(SqliteStore::in_memory_with_config(config).unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn each_backend(test: impl Fn(&str, &mut dyn LinkStore)) {
    for (name, mut store) in backends(StoreConfig::default()) {
        test(name, store.as_mut());
    }
}

fn link(input: NodeId, output: NodeId) -> Link {
    Link::new(input, output, "in", LinkType::Input)
}

fn triples(store: &dyn LinkStore) -> Vec<(NodeId, NodeId, u32)> {
    store.snapshot().unwrap().triples()
}

fn render(rows: &[ClosureRow]) -> String {
    rows.iter()
        .map(|r| {
            format!(
                "{}: {} -> {} depth {} ({}, {}, {})",
                r.id, r.parent, r.child, r.depth, r.entry_edge_id, r.direct_edge_id, r.exit_edge_id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A -> B -> C -> D, returning the id of B -> C.
fn build_chain(store: &mut dyn LinkStore) -> LinkId {
    store.insert_link(&link(A, B)).unwrap();
    let bc = store.insert_link(&link(B, C)).unwrap();
    store.insert_link(&link(C, D)).unwrap();
    bc
}

#[test]
fn two_links_close_transitively() {
    each_backend(|name, store| {
        store.insert_link(&link(A, B)).unwrap();
        store.insert_link(&link(B, C)).unwrap();
        assert_eq!(
            triples(store),
            vec![(A, B, 0), (A, C, 1), (B, C, 0)],
            "{}",
            name
        );
    });
}

#[test]
fn extending_the_chain_adds_every_route() {
    each_backend(|name, store| {
        build_chain(store);
        assert_eq!(
            triples(store),
            vec![(A, B, 0), (A, C, 1), (A, D, 2), (B, C, 0), (B, D, 1), (C, D, 0)],
            "{}",
            name
        );
        assert!(store.verify_closure().unwrap().is_consistent(), "{}", name);
    });
}

#[test]
fn deleting_the_middle_link_purges_dependent_rows() {
    each_backend(|name, store| {
        let bc = build_chain(store);
        let before = store.snapshot().unwrap();
        store.delete_link(bc).unwrap();
        let after = store.snapshot().unwrap();

        let removed: Vec<_> = before.diff(&after).removed.iter().map(|r| r.id.0).collect();
        assert_eq!(removed, vec![2, 3, 5, 6], "{}", name);
        assert!(before.diff(&after).added.is_empty(), "{}", name);

        insta::allow_duplicates! {
            insta::assert_snapshot!(render(after.rows()), @r"
            1: 1 -> 2 depth 0 (1, 1, 1)
            4: 3 -> 4 depth 0 (4, 4, 4)
            ");
        }
    });
}

#[test]
fn cycle_closing_link_is_rejected_by_default() {
    each_backend(|name, store| {
        build_chain(store);
        let before = store.snapshot().unwrap();
        let err = store.insert_link(&link(D, A)).unwrap_err();
        assert!(
            matches!(err, StorageError::Cycle { input, output } if input == D && output == A),
            "{}: {:?}",
            name,
            err
        );
        assert_eq!(store.snapshot().unwrap(), before, "{}", name);
        assert_eq!(store.list_links().unwrap().len(), 3, "{}", name);
    });
}

#[test]
fn cycle_closing_link_is_stored_untracked_under_untrack_policy() {
    let config = StoreConfig {
        cycle_policy: CyclePolicy::Untrack,
        ..StoreConfig::default()
    };
    for (name, mut store) in backends(config) {
        let store = store.as_mut();
        build_chain(store);
        let before = store.snapshot().unwrap();
        let id = store.insert_link(&link(D, A)).unwrap();
        assert!(!store.get_link(id).unwrap().link.include_in_closure, "{}", name);
        assert_eq!(store.snapshot().unwrap(), before, "{}", name);
        assert!(!store.is_ancestor(D, A).unwrap(), "{}", name);
    }
}

#[test]
fn diamond_keeps_both_routes() {
    each_backend(|name, store| {
        store
            .insert_links(&[link(A, X), link(A, Y), link(X, Z), link(Y, Z)])
            .unwrap();
        let routes = store.paths_between(A, Z).unwrap();
        assert_eq!(routes.len(), 2, "{}", name);
        assert!(routes.iter().all(|r| r.depth == 1), "{}", name);
        assert_ne!(routes[0].entry_edge_id, routes[1].entry_edge_id, "{}", name);
        assert_eq!(store.descendants(A, None).unwrap(), vec![X, Y, Z], "{}", name);
    });
}

#[test]
fn reinserting_a_tracked_pair_leaves_closure_unchanged() {
    each_backend(|name, store| {
        build_chain(store);
        let before = store.snapshot().unwrap();
        store.insert_link(&link(B, C)).unwrap();
        assert_eq!(store.snapshot().unwrap(), before, "{}", name);
    });
}

#[test]
fn reverse_of_a_direct_link_is_rejected() {
    each_backend(|name, store| {
        store.insert_link(&link(A, B)).unwrap();
        assert!(store.insert_link(&link(B, A)).is_err(), "{}", name);
        assert_eq!(triples(store), vec![(A, B, 0)], "{}", name);
    });
}

#[test]
fn deletion_leaves_unrelated_rows_untouched() {
    each_backend(|name, store| {
        build_chain(store);
        store.insert_link(&link(X, Y)).unwrap();
        let cd = store.links_from(C).unwrap()[0].id;
        let before = store.snapshot().unwrap();
        store.delete_link(cd).unwrap();
        let diff = before.diff(&store.snapshot().unwrap());
        assert!(
            diff.removed.iter().all(|r| r.child == D),
            "{}: {:?}",
            name,
            diff.removed
        );
        assert!(store.is_ancestor(X, Y).unwrap(), "{}", name);
        assert!(store.verify_closure().unwrap().is_consistent(), "{}", name);
    });
}

#[test]
fn saturation_holds_for_every_pair_of_rows() {
    each_backend(|name, store| {
        store
            .insert_links(&[link(A, B), link(B, C), link(A, C), link(C, D), link(B, D)])
            .unwrap();
        let rows = store.closure_rows().unwrap();
        for xy in &rows {
            for yz in rows.iter().filter(|r| r.parent == xy.child) {
                let depth = xy.depth + yz.depth + 1;
                assert!(
                    rows.iter()
                        .any(|r| r.parent == xy.parent && r.child == yz.child && r.depth == depth),
                    "{}: missing {} -> {} at depth {}",
                    name,
                    xy.parent,
                    yz.child,
                    depth
                );
            }
        }
        assert!(rows.iter().all(|r| r.parent != r.child), "{}", name);
    });
}

#[test]
fn backends_allocate_identical_ids() {
    let mut memory = InMemoryStore::new();
    let mut sqlite = SqliteStore::in_memory().unwrap();
    for store in [&mut memory as &mut dyn LinkStore, &mut sqlite] {
        let bc = build_chain(store);
        store.insert_link(&link(A, X)).unwrap();
        store.insert_link(&link(X, C)).unwrap();
        store.delete_link(bc).unwrap();
        store.insert_link(&link(B, C)).unwrap();
    }
    assert_eq!(memory.closure_rows().unwrap(), sqlite.closure_rows().unwrap());
    assert_eq!(memory.list_links().unwrap(), sqlite.list_links().unwrap());
}

#[test]
fn rebuild_matches_incremental_maintenance() {
    each_backend(|name, store| {
        build_chain(store);
        store.insert_link(&link(A, C)).unwrap();
        store
            .insert_link(&Link::new(D, A, "result", LinkType::Return))
            .unwrap();
        let incremental: ClosureSnapshot = store.snapshot().unwrap();
        let rows = store.rebuild_closure().unwrap();
        assert_eq!(rows, incremental.len(), "{}", name);
        assert_eq!(
            store.snapshot().unwrap().fingerprint(),
            incremental.fingerprint(),
            "{}",
            name
        );
    });
}
