//! Persistence for run records.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::StoreError;
use crate::record::{NewRun, RunId, RunRecord, RunStatus, RunUpdate, STATUS_COMPLETE};
use crate::storage::Pool;

/// Durable table of runs.
///
/// Implementations must assign a unique id atomically on insert and scope
/// every update to a single row.
pub trait RunStore {
    fn insert(&self, run: &NewRun) -> Result<RunId, StoreError>;

    /// Returns `Ok(false)` when no row has `id`.
    fn update(&self, id: RunId, update: &RunUpdate) -> Result<bool, StoreError>;

    /// Most recently started completed run for `script`.
    fn last_completed(&self, script: &str) -> Result<Option<RunRecord>, StoreError>;

    /// Up to `limit` runs for `script`, newest first, in any state.
    fn recent(&self, script: &str, limit: usize) -> Result<Vec<RunRecord>, StoreError>;
}

/// [`RunStore`] over the `cron_log` SQLite table.
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: Pool,
}

const SELECT_COLUMNS: &str = "SELECT id, script, message, start_time, exit_time, status FROM cron_log";

impl SqliteRunStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Fetch a single run by id.
    pub fn get(&self, id: RunId) -> Result<Option<RunRecord>, StoreError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

impl RunStore for SqliteRunStore {
    fn insert(&self, run: &NewRun) -> Result<RunId, StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cron_log (script, message, start_time) VALUES (?1, ?2, ?3)",
            params![run.script, run.message, run.start_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, id: RunId, update: &RunUpdate) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        // `id` is the primary key, so at most one row matches.
        let changed = match update {
            RunUpdate::Progress { message, exit_time } => conn.execute(
                "UPDATE cron_log SET message = ?1, exit_time = ?2 WHERE id = ?3",
                params![message, exit_time, id],
            )?,
            RunUpdate::Complete { exit_time } => conn.execute(
                "UPDATE cron_log SET exit_time = ?1, status = ?2 WHERE id = ?3",
                params![exit_time, RunStatus::Complete.as_column(), id],
            )?,
        };
        Ok(changed == 1)
    }

    fn last_completed(&self, script: &str) -> Result<Option<RunRecord>, StoreError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!(
                    "{SELECT_COLUMNS} WHERE script = ?1 AND status = ?2
                     ORDER BY start_time DESC, id DESC LIMIT 1"
                ),
                params![script, STATUS_COMPLETE],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn recent(&self, script: &str, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE script = ?1 ORDER BY start_time DESC, id DESC LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![script, limit], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: Option<String> = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        script: row.get(1)?,
        message: row.get(2)?,
        start_time: row.get(3)?,
        exit_time: row.get(4)?,
        status: RunStatus::from_column(status.as_deref()),
    })
}
