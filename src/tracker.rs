//! Lifecycle bookkeeping for a single run of a named task.
//!
//! ```text
//! start("Jobs/Sync") -> update("50 rows")* -> finish()
//! ```
//!
//! Each tracker holds at most one run id and is meant to be driven by one
//! task execution. Concurrent runs of the same task use separate trackers;
//! the store is the only shared state.

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::clock::{format_timestamp, Clock};
use crate::error::TrackerError;
use crate::record::{NewRun, RunId, RunRecord, RunUpdate, STARTED_MESSAGE};
use crate::store::RunStore;

#[derive(Debug, Clone, Copy)]
struct HeldRun {
    id: RunId,
    finished: bool,
}

pub struct RunTracker<'a> {
    store: &'a dyn RunStore,
    clock: &'a dyn Clock,
    held: Option<HeldRun>,
}

impl<'a> RunTracker<'a> {
    pub fn new(store: &'a dyn RunStore, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            clock,
            held: None,
        }
    }

    /// Id of the run this tracker is bound to, if `start` has succeeded.
    pub fn active_run(&self) -> Option<RunId> {
        self.held.map(|h| h.id)
    }

    /// Record the start of a run of `script`.
    ///
    /// Fails with [`TrackerError::RunInProgress`] if the held run has not
    /// been finished. On store failure nothing is held.
    pub fn start(&mut self, script: &str) -> Result<RunId, TrackerError> {
        if let Some(held) = self.held.filter(|h| !h.finished) {
            warn!(%script, run_id = held.id, "start called while a run is still open");
            return Err(TrackerError::RunInProgress(held.id));
        }

        let run = NewRun {
            script: script.to_string(),
            message: STARTED_MESSAGE.to_string(),
            start_time: format_timestamp(&self.clock.now()),
        };

        let id = self.store.insert(&run).map_err(|e| {
            warn!(%script, error = %e, "failed to record run start");
            e
        })?;

        self.held = Some(HeldRun {
            id,
            finished: false,
        });
        info!(%script, run_id = id, start_time = %run.start_time, "run started");
        Ok(id)
    }

    /// Overwrite the held run's message and stamp its exit time.
    ///
    /// `Ok(false)` means the row no longer exists; the tracker then holds
    /// nothing.
    pub fn update(&mut self, message: &str) -> Result<bool, TrackerError> {
        let id = self.held_id()?;
        let exit_time = format_timestamp(&self.clock.now());
        let update = RunUpdate::Progress {
            message: message.to_string(),
            exit_time,
        };

        let written = self.write(id, &update)?;
        debug!(run_id = id, %message, written, "run updated");
        Ok(written)
    }

    /// Mark the held run complete. The message is left as it was.
    ///
    /// Calling it again re-stamps `exit_time`.
    pub fn finish(&mut self) -> Result<bool, TrackerError> {
        let id = self.held_id()?;
        let update = RunUpdate::Complete {
            exit_time: format_timestamp(&self.clock.now()),
        };

        let written = self.write(id, &update)?;
        if written {
            if let Some(held) = self.held.as_mut() {
                held.finished = true;
            }
        }
        info!(run_id = id, written, "run finished");
        Ok(written)
    }

    /// Start time of the most recent completed run of `script`, or `None`
    /// if it has never completed.
    pub fn last_ran(
        store: &dyn RunStore,
        tz: Tz,
        script: &str,
    ) -> Result<Option<DateTime<Tz>>, TrackerError> {
        match store.last_completed(script)? {
            Some(record) => Ok(Some(record.started_at(tz)?)),
            None => Ok(None),
        }
    }

    /// Recent runs of `script` in any state, newest first.
    pub fn history(
        store: &dyn RunStore,
        script: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, TrackerError> {
        Ok(store.recent(script, limit)?)
    }

    /// Schema provisioning lives in [`crate::storage::schema::migrate`].
    pub fn build_table(&self) -> Result<(), TrackerError> {
        Err(TrackerError::NotImplemented("build_table"))
    }

    fn held_id(&self) -> Result<RunId, TrackerError> {
        match self.held {
            Some(held) => Ok(held.id),
            None => {
                warn!("update or finish called without a started run");
                Err(TrackerError::NoActiveRun)
            }
        }
    }

    /// A missing row releases the held id, so the tracker can start again.
    fn write(&mut self, id: RunId, update: &RunUpdate) -> Result<bool, TrackerError> {
        let written = self.store.update(id, update).map_err(|e| {
            warn!(run_id = id, error = %e, "failed to write run update");
            e
        })?;
        if !written {
            warn!(run_id = id, "run row not found, releasing it");
            self.held = None;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::record::RunStatus;
    use crate::storage::{open_memory_pool, Pool};
    use crate::store::SqliteRunStore;
    use chrono::{Duration, TimeZone};

    const TZ: Tz = chrono_tz::Pacific::Auckland;

    fn setup() -> (SqliteRunStore, ManualClock) {
        let (store, clock, _) = setup_with_pool();
        (store, clock)
    }

    fn setup_with_pool() -> (SqliteRunStore, ManualClock, Pool) {
        let pool = open_memory_pool().unwrap();
        let store = SqliteRunStore::new(pool.clone());
        let clock = ManualClock::at(TZ, "2024-06-01 02:00:00").unwrap();
        (store, clock, pool)
    }

    /// Store double that refuses every call.
    struct FailingStore;

    impl RunStore for FailingStore {
        fn insert(&self, _: &NewRun) -> Result<RunId, StoreError> {
            Err(StoreError::Unavailable("mock store failure".into()))
        }
        fn update(&self, _: RunId, _: &RunUpdate) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("mock store failure".into()))
        }
        fn last_completed(&self, _: &str) -> Result<Option<RunRecord>, StoreError> {
            Err(StoreError::Unavailable("mock store failure".into()))
        }
        fn recent(&self, _: &str, _: usize) -> Result<Vec<RunRecord>, StoreError> {
            Err(StoreError::Unavailable("mock store failure".into()))
        }
    }

    #[test]
    fn test_start_creates_started_record() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);

        let id = tracker.start("IntegrationX/fullImport").unwrap();
        assert_eq!(tracker.active_run(), Some(id));

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.script, "IntegrationX/fullImport");
        assert_eq!(row.message, "started");
        assert_eq!(row.start_time, "2024-06-01 02:00:00");
        assert_eq!(row.exit_time, None);
        assert_eq!(row.status, RunStatus::Started);
    }

    #[test]
    fn test_update_overwrites_message_and_exit_time() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        let id = tracker.start("Jobs/Sync").unwrap();

        clock.advance(Duration::minutes(1));
        assert!(tracker.update("50 rows").unwrap());
        clock.advance(Duration::minutes(1));
        assert!(tracker.update("100 rows").unwrap());

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.message, "100 rows");
        assert_eq!(row.exit_time.as_deref(), Some("2024-06-01 02:02:00"));
        assert_eq!(row.start_time, "2024-06-01 02:00:00");
        assert_eq!(row.script, "Jobs/Sync");
        assert_eq!(row.status, RunStatus::Started);
    }

    #[test]
    fn test_finish_completes_without_touching_message() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        let id = tracker.start("Jobs/Sync").unwrap();
        tracker.update("50 rows").unwrap();

        clock.advance(Duration::seconds(30));
        assert!(tracker.finish().unwrap());

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Complete);
        assert_eq!(row.message, "50 rows");
        assert_eq!(row.exit_time.as_deref(), Some("2024-06-01 02:00:30"));
        assert_eq!(row.duration(TZ).unwrap(), Some(Duration::seconds(30)));
    }

    #[test]
    fn test_finish_twice_restamps_exit_time() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        let id = tracker.start("Jobs/Sync").unwrap();
        assert!(tracker.finish().unwrap());
        clock.advance(Duration::seconds(5));
        assert!(tracker.finish().unwrap());

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.status, RunStatus::Complete);
        assert_eq!(row.exit_time.as_deref(), Some("2024-06-01 02:00:05"));
    }

    #[test]
    fn test_update_and_finish_require_start() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        assert!(matches!(tracker.update("x"), Err(TrackerError::NoActiveRun)));
        assert!(matches!(tracker.finish(), Err(TrackerError::NoActiveRun)));
    }

    #[test]
    fn test_second_start_before_finish_is_rejected() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        let id = tracker.start("Jobs/Sync").unwrap();

        match tracker.start("Jobs/Sync") {
            Err(TrackerError::RunInProgress(held)) => assert_eq!(held, id),
            other => panic!("expected RunInProgress, got {other:?}"),
        }
        assert_eq!(tracker.active_run(), Some(id));
        assert_eq!(store.recent("Jobs/Sync", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_start_after_finish_begins_new_run() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        let first = tracker.start("Jobs/Sync").unwrap();
        tracker.finish().unwrap();

        clock.advance(Duration::hours(1));
        let second = tracker.start("Jobs/Sync").unwrap();
        assert_ne!(first, second);
        assert_eq!(tracker.active_run(), Some(second));
    }

    #[test]
    fn test_failed_start_holds_nothing() {
        let clock = ManualClock::at(TZ, "2024-06-01 02:00:00").unwrap();
        let store = FailingStore;
        let mut tracker = RunTracker::new(&store, &clock);

        assert!(matches!(tracker.start("Jobs/Sync"), Err(TrackerError::Store(_))));
        assert_eq!(tracker.active_run(), None);
        assert!(matches!(tracker.update("x"), Err(TrackerError::NoActiveRun)));
    }

    #[test]
    fn test_last_ran_lookup_failure_is_error_not_none() {
        let result = RunTracker::last_ran(&FailingStore, TZ, "Jobs/Sync");
        assert!(matches!(result, Err(TrackerError::Store(_))));
    }

    #[test]
    fn test_last_ran_returns_latest_completed_start() {
        let (store, clock) = setup();

        let mut first = RunTracker::new(&store, &clock);
        first.start("Jobs/Sync").unwrap();
        first.finish().unwrap();

        clock.advance(Duration::hours(1));
        let mut second = RunTracker::new(&store, &clock);
        second.start("Jobs/Sync").unwrap();
        let second_start = clock.now();
        second.finish().unwrap();

        clock.advance(Duration::hours(1));
        let mut unfinished = RunTracker::new(&store, &clock);
        unfinished.start("Jobs/Sync").unwrap();

        let last = RunTracker::last_ran(&store, TZ, "Jobs/Sync").unwrap();
        assert_eq!(last, Some(second_start));
    }

    #[test]
    fn test_last_ran_never_returns_unfinished() {
        let (store, clock) = setup();
        let mut tracker = RunTracker::new(&store, &clock);
        tracker.start("Jobs/Sync").unwrap();
        tracker.update("working").unwrap();

        assert_eq!(RunTracker::last_ran(&store, TZ, "Jobs/Sync").unwrap(), None);
        assert_eq!(RunTracker::last_ran(&store, TZ, "NeverRun").unwrap(), None);
    }

    #[test]
    fn test_missing_row_releases_tracker() {
        let (store, clock, pool) = setup_with_pool();
        let mut tracker = RunTracker::new(&store, &clock);
        let id = tracker.start("Jobs/Sync").unwrap();

        pool.get()
            .unwrap()
            .execute("DELETE FROM cron_log WHERE id = ?1", [id])
            .unwrap();

        assert!(!tracker.finish().unwrap());
        assert_eq!(tracker.active_run(), None);
        assert!(matches!(tracker.update("x"), Err(TrackerError::NoActiveRun)));

        let next = tracker.start("Jobs/Sync").unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn test_repeated_fall_back_hour_reads_back_first_occurrence() {
        // NZ DST ended 2024-04-07 03:00 NZDT; 02:00-03:00 local happens twice.
        // The stored wall-clock text cannot tell the two apart, so a run
        // started in the second pass reads back one hour earlier.
        let (store, clock) = setup();
        let second_pass = chrono::Utc
            .with_ymd_and_hms(2024, 4, 6, 14, 30, 0)
            .unwrap()
            .with_timezone(&TZ);
        clock.set(second_pass);

        let mut tracker = RunTracker::new(&store, &clock);
        tracker.start("Jobs/Sync").unwrap();
        tracker.finish().unwrap();

        let last = RunTracker::last_ran(&store, TZ, "Jobs/Sync").unwrap().unwrap();
        assert_eq!(format_timestamp(&last), format_timestamp(&second_pass));
        assert_eq!(second_pass - last, Duration::hours(1));
    }

    #[test]
    fn test_build_table_not_implemented() {
        let (store, clock) = setup();
        let tracker = RunTracker::new(&store, &clock);
        assert!(matches!(
            tracker.build_table(),
            Err(TrackerError::NotImplemented("build_table"))
        ));
    }
}
