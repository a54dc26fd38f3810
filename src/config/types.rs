use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for Search-Trawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub query: QueryConfig,
    pub output: OutputConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, rename = "account")]
    pub accounts: Vec<AccountEntry>,
}

/// Search query and pacing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Keyword expression, e.g. `("quake" OR "tremor")`
    pub keywords: String,

    /// Language code appended as `lang:<code>`
    pub lang: String,

    /// Result ranking mode
    #[serde(default)]
    pub ranking: Ranking,

    /// Range start, `YYYY-MM-DD HH:MM:SS` (UTC)
    pub start: String,

    /// Range end (exclusive), `YYYY-MM-DD HH:MM:SS` (UTC)
    pub end: String,

    /// Length of each search window in minutes
    #[serde(rename = "window-minutes")]
    pub window_minutes: u32,

    /// Soft target of posts to collect per window
    #[serde(rename = "posts-per-window")]
    pub posts_per_window: u32,

    /// Posts requested per search call
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Delay after a page that yielded new posts (seconds)
    #[serde(rename = "page-delay-secs", default = "default_delay_secs")]
    pub page_delay_secs: u64,

    /// Delay between windows (seconds)
    #[serde(rename = "window-delay-secs", default = "default_delay_secs")]
    pub window_delay_secs: u64,
}

fn default_delay_secs() -> u64 {
    2
}

/// Search result ranking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Ranking {
    #[default]
    Latest,
    Top,
    Media,
}

impl Ranking {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "Latest",
            Self::Top => "Top",
            Self::Media => "Media",
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the output table file
    pub destination: String,

    /// Path of the run journal database (checkpoints and seen posts)
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Directory holding persisted session artifacts
    #[serde(rename = "sessions-dir")]
    pub sessions_dir: String,

    /// Optional markdown run summary
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

/// Search gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the search gateway
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("search-trawl/{}", env!("CARGO_PKG_VERSION"))
}

/// Retry and backoff overrides. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "rate-limit-retries")]
    pub rate_limit_retries: u32,

    #[serde(rename = "rate-limit-wait-secs")]
    pub rate_limit_wait_secs: u64,

    #[serde(rename = "network-retries")]
    pub network_retries: u32,

    #[serde(rename = "network-wait-min-secs")]
    pub network_wait_min_secs: u64,

    #[serde(rename = "network-wait-max-secs")]
    pub network_wait_max_secs: u64,

    #[serde(rename = "login-attempts")]
    pub login_attempts: u32,

    #[serde(rename = "login-wait-min-secs")]
    pub login_wait_min_secs: u64,

    #[serde(rename = "login-wait-max-secs")]
    pub login_wait_max_secs: u64,

    #[serde(rename = "login-rate-limit-wait-secs")]
    pub login_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_retries: 2,
            rate_limit_wait_secs: 5,
            network_retries: 3,
            network_wait_min_secs: 10,
            network_wait_max_secs: 20,
            login_attempts: 2,
            login_wait_min_secs: 10,
            login_wait_max_secs: 20,
            login_rate_limit_wait_secs: 5,
        }
    }
}

/// One account available for rotation
#[derive(Clone, Deserialize)]
pub struct AccountEntry {
    pub username: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEntry")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated, immutable parameters of one run
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameters {
    pub keywords: String,
    pub lang: String,
    pub ranking: Ranking,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub window: chrono::Duration,
    pub target_per_window: u32,
    pub page_size: u32,
    pub page_delay: Duration,
    pub window_delay: Duration,
    pub destination: String,
}

impl QueryParameters {
    /// Hard ceiling on pages fetched for one window
    ///
    /// The target is a soft goal; this ceiling only guarantees termination
    /// when the API keeps returning small pages.
    pub fn page_ceiling(&self) -> u32 {
        let per_page = (self.page_size / 2).max(1);
        self.target_per_window / per_page + 10
    }
}

/// Retry and backoff constants resolved to durations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries granted to a rate-limited page before a rotate signal
    pub rate_limit_retries: u32,
    pub rate_limit_wait: Duration,
    /// Retries granted to a page failing with network errors before a skip
    pub network_retries: u32,
    pub network_wait_min: Duration,
    pub network_wait_max: Duration,
    /// Login attempts per account before the login is fatal
    pub login_attempts: u32,
    pub login_wait_min: Duration,
    pub login_wait_max: Duration,
    pub login_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            rate_limit_retries: config.rate_limit_retries,
            rate_limit_wait: Duration::from_secs(config.rate_limit_wait_secs),
            network_retries: config.network_retries,
            network_wait_min: Duration::from_secs(config.network_wait_min_secs),
            network_wait_max: Duration::from_secs(config.network_wait_max_secs),
            login_attempts: config.login_attempts,
            login_wait_min: Duration::from_secs(config.login_wait_min_secs),
            login_wait_max: Duration::from_secs(config.login_wait_max_secs),
            login_rate_limit_wait: Duration::from_secs(config.login_rate_limit_wait_secs),
        }
    }
}

impl RetryPolicy {
    /// A policy with every wait set to zero, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            rate_limit_wait: Duration::ZERO,
            network_wait_min: Duration::ZERO,
            network_wait_max: Duration::ZERO,
            login_wait_min: Duration::ZERO,
            login_wait_max: Duration::ZERO,
            login_rate_limit_wait: Duration::ZERO,
            ..Self::default()
        }
    }
}
