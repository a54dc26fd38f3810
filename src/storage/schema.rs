//! Database schema definitions for the run journal

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track trawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    query_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    checkpoint TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_query_hash ON runs(query_hash);

-- Post identifiers seen by each run (the dedup ledger)
CREATE TABLE IF NOT EXISTS seen_posts (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    post_id TEXT NOT NULL,
    PRIMARY KEY (run_id, post_id)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
