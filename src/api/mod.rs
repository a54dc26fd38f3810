//! Search API contract
//!
//! The scraping core talks to the remote platform only through the
//! [`SearchApi`] trait. [`HttpSearchApi`] is a thin adapter for a JSON search
//! gateway; tests drive the core with the scripted fake instead.

mod http;
#[cfg(any(test, feature = "test-support"))]
mod scripted;

pub use http::{build_http_client, HttpSearchApi};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{raw_post, ScriptedApi};

use crate::config::Ranking;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Failures reported by a [`SearchApi`] implementation
///
/// The variants mirror what the platform can tell us, not what we do about
/// it; mapping to a retry decision is the error classifier's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("account locked: {0}")]
    AccountLocked(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// Any other error reported by the platform itself
    #[error("api error: {0}")]
    Api(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

/// Login credentials for one account
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identifier: String,
    /// Alternate identifier (often an email) some login flows ask for
    pub secondary_identifier: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secondary_identifier: None,
            secret: Some(secret.into()),
        }
    }

    /// Secondary identifier, falling back to the primary one
    pub fn secondary(&self) -> &str {
        self.secondary_identifier
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.identifier)
    }

    /// Returns true if these credentials can attempt a login
    pub fn can_login(&self) -> bool {
        !self.identifier.is_empty() && self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secondary_identifier", &self.secondary_identifier)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// An authenticated (or guest) session
///
/// This is also the persisted session artifact: serializing it is all that is
/// needed to reuse the session without logging in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSession {
    /// Account name the platform reports for this session
    pub account: String,
    #[serde(default)]
    pub guest: bool,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

/// One search result as returned by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: String,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub repost_count: Option<u64>,
    #[serde(default)]
    pub favorite_count: Option<u64>,
}

/// Remote search API and its authentication primitives
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Logs in with credentials, producing a session
    async fn login(&self, credentials: &Credentials) -> Result<ApiSession, ApiError>;

    /// Opens an unauthenticated guest session
    async fn guest(&self) -> Result<ApiSession, ApiError>;

    /// Validates a previously persisted session before reuse
    ///
    /// The default accepts the artifact as-is.
    async fn restore(&self, session: ApiSession) -> Result<ApiSession, ApiError> {
        Ok(session)
    }

    /// Runs one search request and returns at most `count` results,
    /// newest first
    async fn search(
        &self,
        session: &ApiSession,
        query: &str,
        ranking: Ranking,
        count: u32,
    ) -> Result<Vec<RawPost>, ApiError>;
}
