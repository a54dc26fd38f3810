//! Statistics from the run journal and the output table
//!
//! This module backs `--stats`.

use crate::output::table::load_rows;
use crate::state::Checkpoint;
use crate::storage::{RunRecord, Storage};
use crate::TrawlError;
use std::path::Path;

/// One journal run with its progress
#[derive(Debug, Clone)]
pub struct RunStatistics {
    pub run: RunRecord,
    /// Distinct posts the run has seen
    pub seen_posts: u64,
    pub checkpoint: Option<Checkpoint>,
}

/// Journal and output statistics
#[derive(Debug, Clone)]
pub struct TrawlStatistics {
    /// Runs, newest first
    pub runs: Vec<RunStatistics>,
    /// Rows in the output table; None if it does not exist yet
    pub output_rows: Option<u64>,
}

/// Loads statistics from storage and the output file
///
/// # Arguments
///
/// * `storage` - The journal to query
/// * `destination` - Path of the output table file
///
/// # Returns
///
/// * `Ok(TrawlStatistics)` - Successfully loaded statistics
/// * `Err(TrawlError)` - Failed to query the journal or read the output
pub fn load_statistics(
    storage: &dyn Storage,
    destination: &Path,
) -> Result<TrawlStatistics, TrawlError> {
    let mut runs = Vec::new();
    for run in storage.list_runs()? {
        let seen_posts = storage.count_seen(run.id)?;
        // an unreadable checkpoint should not hide the rest of the stats
        let checkpoint = storage.load_checkpoint(run.id).unwrap_or_else(|e| {
            tracing::warn!(run_id = run.id, error = %e, "Unreadable checkpoint");
            None
        });
        runs.push(RunStatistics {
            run,
            seen_posts,
            checkpoint,
        });
    }

    let output_rows = if destination.exists() {
        Some(load_rows(destination)?.len() as u64)
    } else {
        None
    };

    Ok(TrawlStatistics { runs, output_rows })
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &TrawlStatistics) {
    println!("=== Trawl Statistics ===\n");

    match stats.output_rows {
        Some(rows) => println!("Output rows: {}", rows),
        None => println!("Output rows: (no output file yet)"),
    }
    println!("Runs recorded: {}", stats.runs.len());
    println!();

    for entry in &stats.runs {
        let run = &entry.run;
        println!("Run #{} [{}]", run.id, run.status);
        println!("  Started:  {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Query:    {}", &run.query_hash[..run.query_hash.len().min(12)]);
        println!("  Seen:     {} posts", entry.seen_posts);
        match &entry.checkpoint {
            Some(checkpoint) => println!("  Resume:   {}", checkpoint),
            None => println!("  Resume:   (none)"),
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RunStatus, SqliteStorage};
    use tempfile::TempDir;

    #[test]
    fn test_load_statistics() {
        let dir = TempDir::new().unwrap();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("abcdef").unwrap();
        storage
            .record_seen(run_id, &[crate::state::PostId::parse("1").unwrap()])
            .unwrap();
        storage.finish_run(run_id, RunStatus::Completed).unwrap();

        let stats = load_statistics(&storage, &dir.path().join("none.db")).unwrap();
        assert_eq!(stats.runs.len(), 1);
        assert_eq!(stats.runs[0].seen_posts, 1);
        assert!(stats.runs[0].checkpoint.is_none());
        assert_eq!(stats.output_rows, None);

        print_statistics(&stats);
    }
}
