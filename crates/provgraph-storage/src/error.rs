//! Storage error types for provgraph-storage.
//!
//! [`StorageError`] covers every failure the Edge Store surfaces: database
//! and migration failures, missing links, rejected links (self-loop, cycle,
//! caller-level duplicate), and fatal closure inconsistencies.

use thiserror::Error;

use provgraph_core::{CoreError, NodeId};

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// The link failed core validation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A link with the given ID was not found.
    #[error("link not found: {0}")]
    LinkNotFound(i64),

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// The link would close a cycle in the transitive closure.
    #[error("link {input} -> {output} would create a cycle")]
    Cycle { input: NodeId, output: NodeId },

    /// A link with the same endpoints and label already exists.
    #[error("duplicate link {input} -> {output} with label '{label}'")]
    DuplicateLink {
        input: NodeId,
        output: NodeId,
        label: String,
    },

    /// The Closure Store contradicts its own invariants. Always a bug.
    #[error("closure store inconsistent: {reason}")]
    Inconsistent { reason: String },
}

impl StorageError {
    /// Returns `true` for SQLite lock contention that a retry may clear.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}
