//! cronlog -- run bookkeeping for recurring jobs.
//!
//! Records when a named task starts, its progress messages, and when it
//! completes, one row per run in a SQLite `cron_log` table, and answers
//! "when did this task last complete?".
//!
//! ```no_run
//! use cronlog::{clock::SystemClock, storage, store::SqliteRunStore, tracker::RunTracker};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = SqliteRunStore::new(storage::open_pool("data/cronlog.db")?);
//! let clock = SystemClock::default();
//!
//! let mut run = RunTracker::new(&store, &clock);
//! run.start("IntegrationX/fullImport")?;
//! run.update("500 rows")?;
//! run.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod record;
pub mod storage;
pub mod store;
pub mod tracker;

pub use error::{ClockError, StoreError, TrackerError};
pub use record::{RunId, RunRecord, RunStatus};
pub use tracker::RunTracker;
