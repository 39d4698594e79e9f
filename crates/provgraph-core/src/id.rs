//! Stable ID newtypes for provenance graph entities.
//!
//! All IDs are distinct newtype wrappers over `i64`, providing type safety
//! so that a `NodeId` cannot be accidentally used where a `PathId` is expected.
//! The inner `i64` aligns with SQLite's `INTEGER PRIMARY KEY`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque vertex identifier (a calculation or a piece of data).
///
/// Nodes are owned by the surrounding object layer; the closure engine only
/// ever sees their identifiers and tolerates identifiers that no longer
/// resolve to anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

/// Identifier of a direct link in the Edge Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkId(pub i64);

/// Identifier of a row in the Closure Store.
///
/// `entry_edge_id`, `direct_edge_id` and `exit_edge_id` of a closure row are
/// all `PathId`s: they point at other closure rows, never at links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathId(pub i64);

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(raw: i64) -> Self {
        NodeId(raw)
    }
}
