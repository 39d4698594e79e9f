//! Core error types for provgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! link validation failures in the core data model.

use thiserror::Error;

use crate::id::NodeId;

/// Core errors produced by the provgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A closure-eligible link from a node to itself.
    #[error("self-loop on node {node} cannot participate in the transitive closure")]
    SelfLoop { node: NodeId },

    /// A link label that cannot be stored.
    #[error("invalid link label: {reason}")]
    InvalidLabel { reason: String },

    /// An unrecognised link type name.
    #[error("unknown link type: '{name}'")]
    UnknownLinkType { name: String },
}
