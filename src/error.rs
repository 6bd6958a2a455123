//! Error types for the run tracker and its collaborators.

use thiserror::Error;

use crate::record::RunId;

/// Failure reported by a [`RunStore`](crate::store::RunStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Used by backends that are not SQLite (and by test doubles).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Timestamp and timezone failures.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("invalid timestamp '{value}': expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("timestamp '{value}' does not exist in timezone {tz}")]
    NonexistentLocalTime { value: String, tz: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// Errors returned by [`RunTracker`](crate::tracker::RunTracker).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// `update`/`finish` called before a successful `start`.
    #[error("no active run: start() has not succeeded on this tracker")]
    NoActiveRun,

    /// `start` called while the held run has not been finished.
    #[error("run {0} is still in progress on this tracker")]
    RunInProgress(RunId),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Clock(#[from] ClockError),
}
