use crate::config::types::{
    AccountEntry, ApiConfig, Config, OutputConfig, QueryConfig, QueryParameters, RetryConfig,
};
use crate::ConfigError;
use chrono::NaiveDateTime;
use std::time::Duration;
use url::Url;

/// Timestamp layout accepted for `start` and `end`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_query_config(&config.query)?;
    validate_output_config(&config.output)?;
    validate_api_config(&config.api)?;
    validate_retry_config(&config.retry)?;
    validate_accounts(&config.accounts)?;
    Ok(())
}

/// Parses a `YYYY-MM-DD HH:MM:SS` timestamp, interpreted as UTC
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ConfigError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        ConfigError::InvalidTimestamp {
            value: value.to_string(),
        }
    })
}

/// Validates the query section
fn validate_query_config(config: &QueryConfig) -> Result<(), ConfigError> {
    if config.keywords.trim().is_empty() {
        return Err(ConfigError::Validation(
            "keywords cannot be empty".to_string(),
        ));
    }

    if config.lang.trim().is_empty() || config.lang.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "lang must be a single non-empty language code, got '{}'",
            config.lang
        )));
    }

    let start = parse_timestamp(&config.start)?;
    let end = parse_timestamp(&config.end)?;
    if start >= end {
        return Err(ConfigError::Validation(format!(
            "start ({}) must be before end ({})",
            config.start, config.end
        )));
    }

    if config.window_minutes < 1 {
        return Err(ConfigError::Validation(
            "window-minutes must be >= 1".to_string(),
        ));
    }

    if config.posts_per_window < 1 {
        return Err(ConfigError::Validation(format!(
            "posts-per-window must be >= 1, got {}",
            config.posts_per_window
        )));
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.destination.is_empty() {
        return Err(ConfigError::Validation(
            "destination cannot be empty".to_string(),
        ));
    }

    if config.state_path.is_empty() {
        return Err(ConfigError::Validation(
            "state-path cannot be empty".to_string(),
        ));
    }

    if config.state_path == config.destination {
        return Err(ConfigError::Validation(
            "state-path and destination must be different files".to_string(),
        ));
    }

    if config.sessions_dir.is_empty() {
        return Err(ConfigError::Validation(
            "sessions-dir cannot be empty".to_string(),
        ));
    }

    if let Some(summary) = &config.summary_path {
        if summary.is_empty() {
            return Err(ConfigError::Validation(
                "summary-path cannot be empty when given".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates the gateway section
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry overrides
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.network_wait_min_secs > config.network_wait_max_secs {
        return Err(ConfigError::Validation(format!(
            "network-wait-min-secs ({}) exceeds network-wait-max-secs ({})",
            config.network_wait_min_secs, config.network_wait_max_secs
        )));
    }

    if config.login_wait_min_secs > config.login_wait_max_secs {
        return Err(ConfigError::Validation(format!(
            "login-wait-min-secs ({}) exceeds login-wait-max-secs ({})",
            config.login_wait_min_secs, config.login_wait_max_secs
        )));
    }

    if config.login_attempts < 1 {
        return Err(ConfigError::Validation(
            "login-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates account entries
fn validate_accounts(accounts: &[AccountEntry]) -> Result<(), ConfigError> {
    for account in accounts {
        if account.username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "account username cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

impl Config {
    /// Builds the immutable parameter bundle for a run
    pub fn query_parameters(&self) -> Result<QueryParameters, ConfigError> {
        let query = &self.query;
        Ok(QueryParameters {
            keywords: query.keywords.trim().to_string(),
            lang: query.lang.trim().to_string(),
            ranking: query.ranking,
            start: parse_timestamp(&query.start)?,
            end: parse_timestamp(&query.end)?,
            window: chrono::Duration::minutes(i64::from(query.window_minutes)),
            target_per_window: query.posts_per_window,
            page_size: query.page_size,
            page_delay: Duration::from_secs(query.page_delay_secs),
            window_delay: Duration::from_secs(query.window_delay_secs),
            destination: self.output.destination.clone(),
        })
    }
}
