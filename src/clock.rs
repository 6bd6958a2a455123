//! Wall-clock source and the persisted timestamp format.
//!
//! Rows store local wall-clock time in the configured timezone as
//! `YYYY-MM-DD HH:MM:SS`. The format sorts lexicographically, which the
//! `start_time DESC` lookup relies on.

use std::cell::RefCell;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, SubsecRound, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ClockError;

/// `strftime` pattern of every timestamp column in `cron_log`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timezone used when no configuration overrides it.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Pacific::Auckland;

/// Source of "now" in a fixed timezone.
pub trait Clock {
    fn now(&self) -> DateTime<Tz>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        // Stored precision is one second.
        Utc::now().trunc_subsecs(0).with_timezone(&self.tz)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RefCell<DateTime<Tz>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            now: RefCell::new(start),
        }
    }

    /// Start at a wall-clock time given in the persisted format.
    pub fn at(tz: Tz, local: &str) -> Result<Self, ClockError> {
        Ok(Self::new(parse_timestamp(local, tz)?))
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.borrow_mut() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.borrow_mut();
        let next = now.clone() + by;
        *now = next;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        self.now.borrow().clone()
    }
}

/// Render a timestamp in the persisted column format.
pub fn format_timestamp(ts: &DateTime<Tz>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a persisted timestamp as local time in `tz`.
///
/// During a DST fall-back the local hour repeats; the earlier instant wins.
/// Local times skipped by a DST jump cannot have been written by a clock in
/// `tz` and are rejected.
pub fn parse_timestamp(value: &str, tz: Tz) -> Result<DateTime<Tz>, ClockError> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        ClockError::InvalidTimestamp {
            value: value.to_string(),
            source,
        }
    })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) => Ok(ts),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(ClockError::NonexistentLocalTime {
            value: value.to_string(),
            tz: tz.name().to_string(),
        }),
    }
}

/// Resolve an IANA timezone name such as `Pacific/Auckland`.
pub fn parse_timezone(name: &str) -> Result<Tz, ClockError> {
    name.parse::<Tz>()
        .map_err(|_| ClockError::UnknownTimezone(name.to_string()))
}
