//! Error classification and retry policy
//!
//! API failures are first reduced to an [`ErrorKind`]; [`decide`] then turns
//! a kind plus the retries already spent into a [`RetryDecision`]. Both are
//! pure so the page fetcher's behavior can be tested without sleeping.

use crate::api::ApiError;
use crate::config::RetryPolicy;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Message fragments that mark an API-domain error as an account problem
const ACCOUNT_FAILURE_MARKERS: [&str; 4] = ["suspended", "terminated", "deactivated", "restricted"];

/// What went wrong, from the scheduler's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Throttled; retry in place a few times, then rotate the session
    RateLimit,
    /// Transport failure; retry with jittered backoff, then skip the page
    Network,
    /// Anything else recoverable; skip the page
    Transient,
    /// The session itself is gone; new credentials needed
    FatalSession,
    /// The account cannot be used any more; new credentials needed
    FatalAccount,
}

impl ErrorKind {
    /// Returns true if recovery requires new credentials
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalSession | Self::FatalAccount)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RateLimit => "rate-limit",
            Self::Network => "network",
            Self::Transient => "transient",
            Self::FatalSession => "fatal-session",
            Self::FatalAccount => "fatal-account",
        };
        f.write_str(label)
    }
}

/// A classified failure with the identifier of the session that hit it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error from {identifier}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub identifier: String,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Classifies an API error raised under `identifier`
    pub fn from_api(error: &ApiError, identifier: &str) -> Self {
        Self::new(classify(error), identifier, error.to_string())
    }
}

/// Maps an API failure onto an [`ErrorKind`]
///
/// | Error | Kind |
/// |-------|------|
/// | Unauthorized, Forbidden, AccountLocked | FatalAccount |
/// | TooManyRequests | RateLimit |
/// | BadRequest, NotFound, Api mentioning suspension | FatalAccount |
/// | BadRequest, NotFound, Api otherwise | Transient |
/// | Timeout, Connect, Network | Network |
/// | Other | Transient |
pub fn classify(error: &ApiError) -> ErrorKind {
    match error {
        ApiError::Unauthorized(_) | ApiError::Forbidden(_) | ApiError::AccountLocked(_) => {
            ErrorKind::FatalAccount
        }
        ApiError::TooManyRequests(_) => ErrorKind::RateLimit,
        ApiError::BadRequest(message) | ApiError::NotFound(message) | ApiError::Api(message) => {
            if mentions_account_failure(message) {
                ErrorKind::FatalAccount
            } else {
                ErrorKind::Transient
            }
        }
        ApiError::Timeout(_) | ApiError::Connect(_) | ApiError::Network(_) => ErrorKind::Network,
        ApiError::Other(_) => ErrorKind::Transient,
    }
}

fn mentions_account_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    ACCOUNT_FAILURE_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// How long to wait before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// Uniformly random whole seconds in `[min, max]`
    Uniform { min: Duration, max: Duration },
}

impl Backoff {
    /// Picks a concrete delay
    pub fn sample(&self) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Uniform { min, max } => {
                let (lo, hi) = (min.as_secs(), max.as_secs());
                if hi <= lo {
                    min
                } else {
                    Duration::from_secs(rand::rng().random_range(lo..=hi))
                }
            }
        }
    }
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => write!(f, "{}s", delay.as_secs()),
            Self::Uniform { min, max } => write!(f, "{}-{}s", min.as_secs(), max.as_secs()),
        }
    }
}

/// What the page fetcher does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then send the same request again
    RetryAfter(Backoff),
    /// Give up on this page; the window moves on
    Skip,
    /// Give up on this session; the scheduler asks for another account
    RotateSession,
    /// Stop using this session immediately
    Fatal,
}

/// Decides what to do after a failure of `kind`
///
/// `retries_used` counts earlier retries of the same kind for this page.
pub fn decide(kind: ErrorKind, retries_used: u32, policy: &RetryPolicy) -> RetryDecision {
    match kind {
        ErrorKind::FatalAccount | ErrorKind::FatalSession => RetryDecision::Fatal,
        ErrorKind::RateLimit if retries_used < policy.rate_limit_retries => {
            RetryDecision::RetryAfter(Backoff::Fixed(policy.rate_limit_wait))
        }
        ErrorKind::RateLimit => RetryDecision::RotateSession,
        ErrorKind::Network if retries_used < policy.network_retries => {
            RetryDecision::RetryAfter(Backoff::Uniform {
                min: policy.network_wait_min,
                max: policy.network_wait_max,
            })
        }
        ErrorKind::Network => RetryDecision::Skip,
        ErrorKind::Transient => RetryDecision::Skip,
    }
}

/// Backoff before login attempt `attempt + 1`, after attempt `attempt` failed
///
/// Account and API-domain errors scale `[min, max]` by the attempt number,
/// rate limits scale `[wait, wait + 10s]`, transport failures use the plain
/// `[min, max]` range.
pub fn login_backoff(error: &ApiError, attempt: u32, policy: &RetryPolicy) -> Backoff {
    let n = attempt.max(1);
    match error {
        ApiError::TooManyRequests(_) => Backoff::Uniform {
            min: policy.login_rate_limit_wait * n,
            max: (policy.login_rate_limit_wait + Duration::from_secs(10)) * n,
        },
        ApiError::Unauthorized(_)
        | ApiError::Forbidden(_)
        | ApiError::AccountLocked(_)
        | ApiError::BadRequest(_)
        | ApiError::NotFound(_)
        | ApiError::Api(_) => Backoff::Uniform {
            min: policy.login_wait_min * n,
            max: policy.login_wait_max * n,
        },
        ApiError::Timeout(_) | ApiError::Connect(_) | ApiError::Network(_) | ApiError::Other(_) => {
            Backoff::Uniform {
                min: policy.login_wait_min,
                max: policy.login_wait_max,
            }
        }
    }
}
