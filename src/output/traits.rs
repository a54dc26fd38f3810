//! Output sink traits and types
//!
//! This module defines the trait interface for output sinks and the row
//! layout they store.

use crate::state::Post;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One output row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRow {
    /// 1-based position in the output, continuous across runs
    pub sequence: u64,
    pub author: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub body: String,
    pub reposts: u64,
    pub favorites: u64,
}

impl PostRow {
    pub fn from_post(sequence: u64, post: &Post) -> Self {
        Self {
            sequence,
            author: post.author.clone(),
            timestamp: post.timestamp.clone(),
            body: post.text.clone(),
            reposts: post.repost_count,
            favorites: post.favorite_count,
        }
    }
}

/// Durable tabular destination for collected posts
///
/// Appends are buffered; nothing reaches the destination until `persist`.
pub trait OutputSink: Send {
    /// Buffers posts as new rows, numbered after the existing ones
    fn append(&mut self, posts: &[Post]);

    /// Writes buffered rows to the destination
    ///
    /// Returns false if nothing could be written. A failed persist never
    /// damages rows persisted earlier, and the buffered rows stay queued
    /// for the next attempt.
    fn persist(&mut self) -> bool;

    /// Total rows, persisted or not
    fn rows_written(&self) -> u64;

    /// Current destination; changes if a locked file forced a fallback
    fn destination(&self) -> &Path;
}
