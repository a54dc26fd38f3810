//! SQLite table file sink
//!
//! Rows live in a single `posts` table. Existing rows are loaded on open so
//! numbering continues where the last run stopped, and each persist writes
//! only the rows added since the previous one.

use crate::output::traits::{OutputError, OutputResult, OutputSink, PostRow};
use crate::state::Post;
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a persist waits on another writer before falling back
const LOCK_WAIT: Duration = Duration::from_millis(500);

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS posts (
    seq INTEGER PRIMARY KEY,
    author TEXT NOT NULL,
    posted_at TEXT NOT NULL,
    body TEXT NOT NULL,
    reposts INTEGER NOT NULL,
    favorites INTEGER NOT NULL
);
";

/// [`OutputSink`] writing to an SQLite table file
pub struct SqliteTableSink {
    path: PathBuf,
    rows: Vec<PostRow>,
    persisted: usize,
}

impl SqliteTableSink {
    /// Opens a sink at `path`, loading any rows already there
    ///
    /// A missing file is fine; it is created on the first persist. An
    /// existing file that cannot be read is left untouched: the sink starts
    /// empty and writes to an alternate file instead.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut path = path.into();
        let rows = if path.exists() {
            match load_rows(&path) {
                Ok(rows) => rows,
                Err(e) => {
                    let fallback = locked_fallback_path(&path);
                    tracing::error!(
                        path = %path.display(),
                        fallback = %fallback.display(),
                        error = %e,
                        "Cannot read existing output; writing to alternate file"
                    );
                    path = fallback;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let persisted = rows.len();
        Self {
            path,
            rows,
            persisted,
        }
    }

    /// Rows held in memory, in order
    pub fn rows(&self) -> &[PostRow] {
        &self.rows
    }

    /// Rows appended since the last successful persist
    pub fn pending(&self) -> usize {
        self.rows.len() - self.persisted
    }
}

impl OutputSink for SqliteTableSink {
    fn append(&mut self, posts: &[Post]) {
        for post in posts {
            let sequence = self.rows.len() as u64 + 1;
            self.rows.push(PostRow::from_post(sequence, post));
        }
    }

    fn persist(&mut self) -> bool {
        match write_rows(&self.path, &self.rows[self.persisted..]) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), rows = self.rows.len(), "Output saved");
                self.persisted = self.rows.len();
                true
            }
            Err(e) if is_locked(&e) => {
                let fallback = locked_fallback_path(&self.path);
                tracing::warn!(
                    path = %self.path.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "Output is locked; saving to alternate file"
                );
                match write_rows(&fallback, &self.rows) {
                    Ok(()) => {
                        tracing::error!(
                            path = %fallback.display(),
                            "'{}' was locked, saved as '{}'",
                            self.path.display(),
                            fallback.display()
                        );
                        self.path = fallback;
                        self.persisted = self.rows.len();
                        true
                    }
                    Err(e) => {
                        tracing::error!(path = %fallback.display(), error = %e, "Saving to alternate file failed");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Saving output failed");
                false
            }
        }
    }

    fn rows_written(&self) -> u64 {
        self.rows.len() as u64
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}

/// Reads every row from an existing table file
pub fn load_rows(path: &Path) -> OutputResult<Vec<PostRow>> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(LOCK_WAIT)?;
    conn.execute_batch(CREATE_TABLE_SQL)?;
    let mut stmt = conn.prepare(
        "SELECT seq, author, posted_at, body, reposts, favorites FROM posts ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PostRow {
                sequence: row.get::<_, i64>(0)? as u64,
                author: row.get(1)?,
                timestamp: row.get(2)?,
                body: row.get(3)?,
                reposts: row.get::<_, i64>(4)? as u64,
                favorites: row.get::<_, i64>(5)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Writes rows in one transaction
///
/// Sequence numbers are never reused; a clash fails the whole write.
fn write_rows(path: &Path, rows: &[PostRow]) -> OutputResult<()> {
    let mut conn = Connection::open(path)?;
    conn.busy_timeout(LOCK_WAIT)?;
    conn.execute_batch(CREATE_TABLE_SQL)?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO posts (seq, author, posted_at, body, reposts, favorites)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            stmt.execute(params![
                row.sequence as i64,
                row.author,
                row.timestamp,
                row.body,
                row.reposts as i64,
                row.favorites as i64
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Returns true for errors meaning "someone else holds this file"
fn is_locked(error: &OutputError) -> bool {
    match error {
        OutputError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
            e.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::ReadOnly
                | ErrorCode::CannotOpen
                | ErrorCode::PermissionDenied
        ),
        OutputError::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
        _ => false,
    }
}

/// `<stem>_locked_<HHMMSS>.<ext>` next to the original
pub fn locked_fallback_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let stamp = chrono::Local::now().format("%H%M%S");
    let name = match path.extension() {
        Some(ext) => format!("{}_locked_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_locked_{}", stem, stamp),
    };
    path.with_file_name(name)
}
