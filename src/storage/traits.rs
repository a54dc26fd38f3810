//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{Checkpoint, PostId};
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every database operation the run journal needs.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run
    ///
    /// # Arguments
    ///
    /// * `query_hash` - Hash of the `[query]` configuration section
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, query_hash: &str) -> StorageResult<i64>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Gets the most recent unfinished run for a query
    ///
    /// Runs left Running, Paused or Interrupted qualify; Completed and
    /// Failed runs never do.
    fn find_resumable_run(&self, query_hash: &str) -> StorageResult<Option<RunRecord>>;

    /// Lists all runs, newest first
    fn list_runs(&self) -> StorageResult<Vec<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Sets a final status and the finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Progress =====

    /// Overwrites the run's checkpoint
    fn save_checkpoint(&mut self, run_id: i64, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Loads the run's checkpoint, if any was saved
    fn load_checkpoint(&self, run_id: i64) -> StorageResult<Option<Checkpoint>>;

    // ===== Dedup Ledger =====

    /// Records post identifiers as seen by the run
    fn record_seen(&mut self, run_id: i64, ids: &[PostId]) -> StorageResult<()>;

    /// Loads every identifier the run has seen
    fn load_seen(&self, run_id: i64) -> StorageResult<Vec<PostId>>;

    /// Counts identifiers the run has seen
    fn count_seen(&self, run_id: i64) -> StorageResult<u64>;
}
