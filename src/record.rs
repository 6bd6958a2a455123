//! Row types for the `cron_log` table.

use chrono::Duration;
use chrono_tz::Tz;
use serde::Serialize;

use crate::clock::parse_timestamp;
use crate::error::ClockError;

/// Store-assigned row identifier.
pub type RunId = i64;

/// Value written to the `status` column on completion.
pub const STATUS_COMPLETE: &str = "complete";

/// Message written by `start`.
pub const STARTED_MESSAGE: &str = "started";

/// Run state. `Started` is the absence of a stored status, not a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Complete,
}

impl RunStatus {
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some(STATUS_COMPLETE) => RunStatus::Complete,
            _ => RunStatus::Started,
        }
    }

    pub fn as_column(self) -> Option<&'static str> {
        match self {
            RunStatus::Started => None,
            RunStatus::Complete => Some(STATUS_COMPLETE),
        }
    }
}

/// One row of `cron_log`. Timestamps are kept in their persisted text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    pub script: String,
    pub message: String,
    pub start_time: String,
    pub exit_time: Option<String>,
    pub status: RunStatus,
}

impl RunRecord {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn started_at(&self, tz: Tz) -> Result<chrono::DateTime<Tz>, ClockError> {
        parse_timestamp(&self.start_time, tz)
    }

    /// Time between start and the last update or finish, if there was one.
    pub fn duration(&self, tz: Tz) -> Result<Option<Duration>, ClockError> {
        let Some(exit_time) = &self.exit_time else {
            return Ok(None);
        };
        let exited = parse_timestamp(exit_time, tz)?;
        Ok(Some(exited - self.started_at(tz)?))
    }
}

/// Fields supplied when a run starts.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub script: String,
    pub message: String,
    pub start_time: String,
}

/// The two mutations a run can receive after creation.
#[derive(Debug, Clone)]
pub enum RunUpdate {
    /// Overwrite `message` and `exit_time`.
    Progress { message: String, exit_time: String },
    /// Set `exit_time` and mark complete; `message` is left alone.
    Complete { exit_time: String },
}
