//! Storage-layer summary types.

use serde::{Deserialize, Serialize};

/// Row counts for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// All stored links.
    pub links: usize,
    /// Links with `include_in_closure` set.
    pub closure_links: usize,
    /// All closure rows.
    pub closure_rows: usize,
    /// Depth-0 closure rows (one per distinct closure-eligible pair).
    pub direct_rows: usize,
    /// Largest closure row depth, if any rows exist.
    pub max_depth: Option<u32>,
}
