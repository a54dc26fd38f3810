//! Search-Trawl: a resumable, rate-limit aware search scraper
//!
//! This crate walks a keyword search over a bounded time range in fixed
//! windows, paging each window through a rate-limited search API under a
//! rotating set of sessions. Results are de-duplicated and appended to a
//! durable table as each window finishes, and progress is checkpointed so a
//! run can be paused, resumed, or moved to a different account mid-window.

pub mod api;
pub mod config;
pub mod observer;
pub mod output;
pub mod prompt;
pub mod run;
pub mod scrape;
pub mod session;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Search-Trawl operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search API error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Login failed for {identifier}: {message}")]
    LoginFailed { identifier: String, message: String },

    #[error("{kind} error from {identifier}: {message}")]
    Classified {
        kind: scrape::ErrorKind,
        identifier: String,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("Run is not active: {0}")]
    NotActive(String),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<scrape::ClassifiedError> for TrawlError {
    fn from(err: scrape::ClassifiedError) -> Self {
        Self::Classified {
            kind: err.kind,
            identifier: err.identifier,
            message: err.message,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid timestamp '{value}': expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { value: String },
}

/// Result type alias for Search-Trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, QueryParameters};
pub use run::{RunCoordinator, RunEvent, RunReport};
pub use state::{Checkpoint, Post, PostId, RunPhase};
