//! End-of-run report

use crate::state::Checkpoint;
use crate::storage::RunStatus;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every window in the range was processed
    Completed,
    /// Stopped by the operator before the range was exhausted
    Stopped,
    /// Never got going (no session, journal failure)
    Failed,
}

impl RunOutcome {
    /// Journal status recorded for this outcome
    pub fn journal_status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Stopped => RunStatus::Interrupted,
            Self::Failed => RunStatus::Failed,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Summary handed back by `RunCoordinator::join`
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub windows_completed: u32,
    pub windows_abandoned: u32,
    /// New posts collected by this invocation
    pub posts_collected: u64,
    /// Rows in the output, including rows from earlier runs
    pub rows_written: u64,
    /// Whether the final persist succeeded
    pub persisted: bool,
    pub final_checkpoint: Option<Checkpoint>,
    pub destination: PathBuf,
    /// Identifier of the last active session
    pub last_account: String,
}

impl RunReport {
    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds().max(0)
    }
}
