//! SQLite storage layer -- connection pool and schema.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: impl AsRef<Path>) -> Result<Pool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    init(&pool)?;

    tracing::debug!(path = %path.display(), "cron_log database ready");
    Ok(pool)
}

/// Open a private in-memory database.
///
/// Every SQLite in-memory connection is its own database, so the pool is
/// capped at one connection.
pub fn open_memory_pool() -> Result<Pool> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder().max_size(1).build(manager)?;
    init(&pool)?;
    Ok(pool)
}

fn init(pool: &Pool) -> Result<()> {
    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn).context("failed to migrate cron_log schema")?;
    Ok(())
}
