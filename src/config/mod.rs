//! Configuration module for Search-Trawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use search_trawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("trawl.toml")).unwrap();
//! println!("Window length: {} minutes", config.query.window_minutes);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AccountEntry, ApiConfig, Config, OutputConfig, QueryConfig, QueryParameters, Ranking,
    RetryConfig, RetryPolicy,
};

// Re-export parser functions
pub use parser::{compute_query_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{parse_timestamp, TIMESTAMP_FORMAT};
