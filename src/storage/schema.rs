//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cron_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            script TEXT NOT NULL,
            message TEXT NOT NULL,
            start_time TEXT NOT NULL,
            exit_time TEXT,
            status TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_cron_log_last_ran
            ON cron_log(script, status, start_time);",
    )?;

    Ok(())
}
