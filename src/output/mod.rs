//! Output module: the post table sink and run reporting
//!
//! This module handles:
//! - Buffering collected posts and persisting them to an SQLite table file
//! - Falling back to an alternate file when the destination is locked
//! - Markdown run summaries and `--stats` output

pub mod stats;
mod summary;
mod table;
mod traits;

pub use stats::{load_statistics, print_statistics, TrawlStatistics};
pub use summary::{format_markdown_summary, generate_markdown_summary};
pub use table::{load_rows, locked_fallback_path, SqliteTableSink};
pub use traits::{OutputError, OutputResult, OutputSink, PostRow};

use std::sync::{Arc, Mutex, MutexGuard};

/// Sink shared between the worker thread and the control side
pub type SharedSink = Arc<Mutex<Box<dyn OutputSink>>>;

/// Wraps a sink for sharing
pub fn share_sink(sink: Box<dyn OutputSink>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Locks a shared sink, recovering from a poisoned lock
pub fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, Box<dyn OutputSink>> {
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
