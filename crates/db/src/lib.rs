//! SQLite storage for tags and consolidated video records.

pub mod migrate;
pub mod repo;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// Concurrent get-or-create calls from bulk searches wait instead of failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Open a pool on `db_path` (a file path or `:memory:`) in WAL mode.
pub async fn connect(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    connect_with(db_path, DEFAULT_MAX_CONNECTIONS).await
}

pub async fn connect_with(db_path: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = db_path == ":memory:";
    if !in_memory {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let opts = SqliteConnectOptions::from_str(db_path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(opts)
        .await?;

    debug!(db_path, in_memory, max_connections, "sqlite pool ready");
    Ok(pool)
}
