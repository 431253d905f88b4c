//! # depeg-db
//!
//! SQLite persistence for the oracle daemon, stored at
//! `$DEPEG_DATA_DIR/depeg.db`.
//!
//! Price history is written through as the in-memory store appends and read
//! back once at startup; every attestation the daemon signs is logged. The
//! daemon is the only writer, so the database runs in WAL mode with relaxed
//! sync. Timestamps are unix seconds and the schema version lives in
//! `PRAGMA user_version`.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    /// A keyed lookup matched no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored JSON payload or encoded value could not be converted.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at `path` and bring it to [`SCHEMA_VERSION`].
pub fn open(path: &Path) -> Result<Connection> {
    debug!(path = %path.display(), "opening database");
    init(Connection::open(path)?)
}

/// In-memory database with the full schema. Used by tests.
pub fn open_memory() -> Result<Connection> {
    init(Connection::open_in_memory()?)
}

fn init(conn: Connection) -> Result<Connection> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // journal_mode reports the resulting mode as a row
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    migrations::run(&conn)?;
    Ok(conn)
}
