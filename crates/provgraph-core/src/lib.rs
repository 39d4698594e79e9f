//! Core data model for the provenance graph closure engine.
//!
//! - [`id`]: NodeId, LinkId, PathId newtypes
//! - [`link`]: direct links as submitted to and stored by the Edge Store
//! - [`path`]: rows of the materialized transitive closure
//! - [`error`]: CoreError for link validation

pub mod error;
pub mod id;
pub mod link;
pub mod path;

// Re-export commonly used types
pub use error::CoreError;
pub use id::{LinkId, NodeId, PathId};
pub use link::{Link, LinkType, StoredLink};
pub use path::{ClosureRow, NewClosureRow};
