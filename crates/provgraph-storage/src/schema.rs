//! Schema migrations and connection setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::config::StoreConfig;
use crate::error::StorageError;

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, the
/// configured busy timeout, and all pending migrations applied.
pub fn open_database(path: &str, config: &StoreConfig) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path)?;
    configure_and_migrate(&mut conn, config)?;
    Ok(conn)
}

/// Opens an in-memory SQLite database with all pending migrations applied.
pub fn open_in_memory(config: &StoreConfig) -> Result<Connection, StorageError> {
    let mut conn = Connection::open_in_memory()?;
    configure_and_migrate(&mut conn, config)?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection, config: &StoreConfig) -> Result<(), StorageError> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    // WAL lets readers proceed while one writer holds the lock.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrations()
        .to_latest(conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    tracing::debug!(
        busy_timeout_ms = config.busy_timeout_ms,
        "sqlite connection configured"
    );
    Ok(())
}
