//! Storage and incremental transitive-closure maintenance for provenance
//! graphs.
//!
//! Provides the [`LinkStore`] trait defining the storage contract that all
//! backends implement, plus [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends.
//!
//! # Architecture
//!
//! The storage layer has two tables:
//! - the **Edge Store** holds every direct link between nodes,
//! - the **Closure Store** holds one row per route between two nodes through
//!   closure-eligible links, so ancestry queries are a single lookup.
//!
//! Callers only mutate the Edge Store. [`ClosureMaintainer`] keeps the
//! Closure Store in step inside the same transaction, running against the
//! [`ClosureTable`] seam that both backends implement.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`config`]: StoreConfig and CyclePolicy
//! - [`table`]: ClosureTable trait
//! - [`maintainer`]: insertion and deletion propagators
//! - [`purge`]: work queue for the deletion cascade
//! - [`arena`]: in-memory ClosureTable
//! - [`traits`]: LinkStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQLite migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`shared`]: SharedLinkStore for use across threads
//! - [`snapshot`]: closure snapshots, diffs and fingerprints
//! - [`verify`]: exhaustive closure verification

pub mod arena;
pub mod config;
pub mod error;
pub mod maintainer;
pub mod memory;
pub mod purge;
pub mod schema;
pub mod shared;
pub mod snapshot;
pub mod sqlite;
pub mod table;
pub mod traits;
pub mod types;
pub mod verify;

// Re-export key types for ergonomic use.
pub use arena::ClosureArena;
pub use config::{CyclePolicy, StoreConfig};
pub use error::StorageError;
pub use maintainer::{Admission, ClosureMaintainer, InsertOutcome};
pub use memory::InMemoryStore;
pub use purge::PurgeList;
pub use shared::SharedLinkStore;
pub use snapshot::{ClosureSnapshot, SnapshotDiff};
pub use sqlite::{SqlClosureTable, SqliteStore};
pub use table::ClosureTable;
pub use traits::LinkStore;
pub use types::StoreStats;
pub use verify::{check_closure, ClosureReport};
