use crate::config::types::{Config, QueryConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use search_trawl::config::load_config;
///
/// let config = load_config(Path::new("trawl.toml")).unwrap();
/// println!("Keywords: {}", config.query.keywords);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the `[query]` section
///
/// Only the query identifies a run: two configs that differ in output paths,
/// pacing overrides or accounts still resume the same journal entry, while any
/// change to keywords, range or window shape starts a new one.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the canonical query section
/// * `Err(ConfigError)` - The query section could not be re-serialized
pub fn compute_query_hash(query: &QueryConfig) -> Result<String, ConfigError> {
    let canonical = toml::to_string(query)
        .map_err(|e| ConfigError::Validation(format!("Cannot serialize query section: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its query hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_query_hash(&config.query)?;
    Ok((config, hash))
}
