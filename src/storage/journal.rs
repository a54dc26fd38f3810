//! Run journal: the scheduler's view of persistent progress

use crate::state::{Checkpoint, DedupLedger, PostId};
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{RunStatus, SqliteStorage};

/// Where progress is recorded while a run is under way
///
/// Called from the worker thread after every page and at every window
/// boundary.
pub trait ProgressJournal {
    /// Overwrites the resumable checkpoint
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Adds identifiers to the persisted ledger
    fn record_seen(&mut self, ids: &[PostId]) -> StorageResult<()>;

    /// Records an intermediate status (Running / Paused)
    fn set_status(&mut self, status: RunStatus) -> StorageResult<()>;

    /// Records the final status
    fn finish(&mut self, status: RunStatus) -> StorageResult<()>;
}

/// State recovered from an earlier, unfinished run
#[derive(Debug, Default)]
pub struct ResumePoint {
    pub checkpoint: Option<Checkpoint>,
    pub ledger: DedupLedger,
}

/// SQLite-backed journal for one run
pub struct RunJournal {
    storage: SqliteStorage,
    run_id: i64,
}

impl RunJournal {
    /// Opens the journal for a query
    ///
    /// Unless `fresh` is set, the newest unfinished run with the same query
    /// hash is picked up again together with its checkpoint and ledger.
    /// Otherwise a new run is created.
    ///
    /// # Returns
    ///
    /// The journal, plus the resume point (empty for a new run)
    pub fn open(
        mut storage: SqliteStorage,
        query_hash: &str,
        fresh: bool,
    ) -> StorageResult<(Self, ResumePoint)> {
        let existing = if fresh {
            None
        } else {
            storage.find_resumable_run(query_hash)?
        };

        match existing {
            Some(run) => {
                storage.update_run_status(run.id, RunStatus::Running)?;
                let checkpoint = storage.load_checkpoint(run.id)?;
                let ledger = DedupLedger::from_ids(storage.load_seen(run.id)?);
                tracing::info!(
                    run_id = run.id,
                    seen = ledger.len(),
                    "Resuming unfinished run"
                );
                Ok((
                    Self {
                        storage,
                        run_id: run.id,
                    },
                    ResumePoint { checkpoint, ledger },
                ))
            }
            None => {
                let run_id = storage.create_run(query_hash)?;
                tracing::info!(run_id, "Started new run");
                Ok((Self { storage, run_id }, ResumePoint::default()))
            }
        }
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }
}

impl ProgressJournal for RunJournal {
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.storage.save_checkpoint(self.run_id, checkpoint)
    }

    fn record_seen(&mut self, ids: &[PostId]) -> StorageResult<()> {
        self.storage.record_seen(self.run_id, ids)
    }

    fn set_status(&mut self, status: RunStatus) -> StorageResult<()> {
        self.storage.update_run_status(self.run_id, status)
    }

    fn finish(&mut self, status: RunStatus) -> StorageResult<()> {
        self.storage.finish_run(self.run_id, status)
    }
}
