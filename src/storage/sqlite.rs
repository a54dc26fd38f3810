//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{Checkpoint, PostId};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::TrawlError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, started_at, finished_at, query_hash, status";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(TrawlError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TrawlError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, TrawlError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        query_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, query_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, query_hash, status, updated_at) VALUES (?1, ?2, ?3, ?1)",
            params![now, query_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn find_resumable_run(&self, query_hash: &str) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM runs
                     WHERE query_hash = ?1 AND status IN (?2, ?3, ?4)
                     ORDER BY id DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![
                    query_hash,
                    RunStatus::Running.to_db_string(),
                    RunStatus::Paused.to_db_string(),
                    RunStatus::Interrupted.to_db_string()
                ],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs ORDER BY id DESC", RUN_COLUMNS))?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Progress =====

    fn save_checkpoint(&mut self, run_id: i64, checkpoint: &Checkpoint) -> StorageResult<()> {
        let json = checkpoint
            .to_json()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET checkpoint = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn load_checkpoint(&self, run_id: i64) -> StorageResult<Option<Checkpoint>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT checkpoint FROM runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;

        json.map(|json| Checkpoint::from_json(&json).map_err(StorageError::Serialization))
            .transpose()
    }

    // ===== Dedup Ledger =====

    fn record_seen(&mut self, run_id: i64, ids: &[PostId]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO seen_posts (run_id, post_id) VALUES (?1, ?2)")?;
            for id in ids {
                stmt.execute(params![run_id, id.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_seen(&self, run_id: i64) -> StorageResult<Vec<PostId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT post_id FROM seen_posts WHERE run_id = ?1")?;
        let rows = stmt.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row?;
            let id = PostId::parse(&raw).ok_or_else(|| {
                StorageError::Serialization(format!("invalid post id '{}' in journal", raw))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn count_seen(&self, run_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM seen_posts WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WindowProgress;
    use chrono::NaiveDate;

    fn ids(raw: &[&str]) -> Vec<PostId> {
        raw.iter().filter_map(|s| PostId::parse(s)).collect()
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_create_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.query_hash, "hash");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_update_missing_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_run().unwrap().is_none());
        assert!(matches!(
            storage.update_run_status(42, RunStatus::Paused),
            Err(StorageError::RunNotFound(42))
        ));
    }

    #[test]
    fn test_find_resumable_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let done = storage.create_run("a").unwrap();
        storage.finish_run(done, RunStatus::Completed).unwrap();
        assert!(storage.find_resumable_run("a").unwrap().is_none());

        let interrupted = storage.create_run("a").unwrap();
        storage
            .update_run_status(interrupted, RunStatus::Interrupted)
            .unwrap();
        storage.create_run("b").unwrap();

        let found = storage.find_resumable_run("a").unwrap().unwrap();
        assert_eq!(found.id, interrupted);
        assert_eq!(storage.list_runs().unwrap().len(), 3);
    }

    #[test]
    fn test_checkpoint_persistence() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        assert!(storage.load_checkpoint(run_id).unwrap().is_none());

        let day = NaiveDate::from_ymd_opt(2024, 2, 6).unwrap();
        let checkpoint = Checkpoint::InWindow(WindowProgress {
            since: day.and_hms_opt(0, 0, 0).unwrap(),
            until: day.and_hms_opt(1, 0, 0).unwrap(),
            cursor: PostId::parse("99"),
            page_index: 2,
            collected: 17,
        });
        storage.save_checkpoint(run_id, &checkpoint).unwrap();

        assert_eq!(storage.load_checkpoint(run_id).unwrap(), Some(checkpoint));
    }

    #[test]
    fn test_seen_posts_ignore_duplicates() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();

        storage.record_seen(run_id, &ids(&["1", "2"])).unwrap();
        storage.record_seen(run_id, &ids(&["2", "3"])).unwrap();

        assert_eq!(storage.count_seen(run_id).unwrap(), 3);
        let mut seen = storage.load_seen(run_id).unwrap();
        seen.sort();
        assert_eq!(seen, ids(&["1", "2", "3"]));
    }

    #[test]
    fn test_finish_run_sets_timestamp() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        storage.finish_run(run_id, RunStatus::Interrupted).unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert!(run.finished_at.is_some());
    }
}
