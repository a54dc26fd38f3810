//! Active session management
//!
//! The manager owns at most one session at a time. Obtaining one tries, in
//! order: a persisted artifact for the account, a login with retry, and (only
//! when no credentials were supplied) a guest session.

use crate::api::{ApiSession, Credentials, SearchApi};
use crate::config::RetryPolicy;
use crate::observer::{RunObserver, Severity};
use crate::run::RunControl;
use crate::scrape::login_backoff;
use crate::session::SessionStore;
use crate::TrawlError;
use std::sync::Arc;

/// Identifier reported for guest sessions
pub const GUEST_IDENTIFIER: &str = "guest";

/// The active session plus the account it belongs to
///
/// Handles are replaced, never mutated; cloning shares the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub identifier: String,
    pub session: Arc<ApiSession>,
}

impl SessionHandle {
    pub fn new(identifier: impl Into<String>, session: ApiSession) -> Self {
        Self {
            identifier: identifier.into(),
            session: Arc::new(session),
        }
    }
}

pub struct SessionManager {
    api: Arc<dyn SearchApi>,
    store: SessionStore,
    policy: RetryPolicy,
    control: Arc<RunControl>,
    observer: Arc<dyn RunObserver>,
    active: Option<SessionHandle>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn SearchApi>,
        store: SessionStore,
        policy: RetryPolicy,
        control: Arc<RunControl>,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            api,
            store,
            policy,
            control,
            observer,
            active: None,
        }
    }

    /// The active session, if any
    pub fn active(&self) -> Option<SessionHandle> {
        self.active.clone()
    }

    /// Identifier of the active session, `N/A` when there is none
    pub fn identifier(&self) -> &str {
        self.active
            .as_ref()
            .map(|handle| handle.identifier.as_str())
            .unwrap_or("N/A")
    }

    /// Drops the active session
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Obtains a session for `credentials`, or a guest session without them
    ///
    /// Readiness on the run control follows the result.
    ///
    /// # Returns
    ///
    /// * `true` - A session is active
    /// * `false` - Login failed or no session could be opened
    pub async fn ensure_session(&mut self, credentials: Option<&Credentials>) -> bool {
        self.active = None;
        let handle = match credentials.filter(|c| !c.identifier.is_empty()) {
            Some(creds) => self.account_session(creds).await,
            None => self.guest_session().await,
        };

        let ready = handle.is_some();
        self.active = handle;
        self.control.set_session_ready(ready);
        self.observer.update_active_account(self.identifier());
        ready
    }

    /// Replaces the active session with one for `credentials`
    ///
    /// Readiness is cleared before anything else happens.
    pub async fn switch(&mut self, credentials: Option<&Credentials>) -> bool {
        self.control.set_session_ready(false);
        self.clear();
        let target = credentials.map(|c| c.identifier.as_str()).unwrap_or(GUEST_IDENTIFIER);
        self.observer
            .log(&format!("Switching session to {}", target), Severity::Info);
        self.ensure_session(credentials).await
    }

    async fn account_session(&mut self, creds: &Credentials) -> Option<SessionHandle> {
        let identifier = creds.identifier.as_str();

        if self.store.exists(identifier) {
            if let Some(handle) = self.restore(identifier).await {
                return Some(handle);
            }
        }

        if !creds.can_login() {
            self.observer.log(
                &format!("No usable secret for {}, falling back to guest", identifier),
                Severity::Warn,
            );
            return self.guest_session().await;
        }

        match self.login_with_retry(creds).await {
            Ok(session) => {
                if let Err(e) = self.store.save(identifier, &session) {
                    self.observer.log(
                        &format!("Could not save session for {}: {}", identifier, e),
                        Severity::Warn,
                    );
                }
                self.observer
                    .log(&format!("Logged in as {}", identifier), Severity::Ok);
                Some(SessionHandle::new(identifier, session))
            }
            Err(e) => {
                self.observer.log(&e.to_string(), Severity::Critical);
                None
            }
        }
    }

    async fn restore(&mut self, identifier: &str) -> Option<SessionHandle> {
        let artifact = match self.store.load(identifier) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.observer.log(
                    &format!("Unreadable session artifact for {}: {}", identifier, e),
                    Severity::Warn,
                );
                self.discard_artifact(identifier);
                return None;
            }
        };

        match self.api.restore(artifact).await {
            Ok(session) => {
                self.observer.log(
                    &format!("Reused saved session for {}", identifier),
                    Severity::Ok,
                );
                Some(SessionHandle::new(identifier, session))
            }
            Err(e) => {
                self.observer.log(
                    &format!("Saved session for {} rejected: {}", identifier, e),
                    Severity::Warn,
                );
                self.discard_artifact(identifier);
                None
            }
        }
    }

    fn discard_artifact(&self, identifier: &str) {
        if let Err(e) = self.store.delete(identifier) {
            tracing::warn!(identifier, error = %e, "Failed to delete session artifact");
        }
    }

    async fn login_with_retry(&self, creds: &Credentials) -> Result<ApiSession, TrawlError> {
        let attempts = self.policy.login_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.observer.log(
                &format!(
                    "Logging in as {} (attempt {}/{})",
                    creds.identifier, attempt, attempts
                ),
                Severity::Info,
            );
            match self.api.login(creds).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt == attempts {
                        break;
                    }
                    let backoff = login_backoff(&e, attempt, &self.policy);
                    let delay = backoff.sample();
                    self.observer.log(
                        &format!(
                            "Login for {} failed: {}; retrying in {}s",
                            creds.identifier,
                            e,
                            delay.as_secs()
                        ),
                        Severity::Warn,
                    );
                    if !self.control.sleep(delay).await {
                        last_error = "interrupted by stop".to_string();
                        break;
                    }
                }
            }
        }

        Err(TrawlError::LoginFailed {
            identifier: creds.identifier.clone(),
            message: last_error,
        })
    }

    async fn guest_session(&self) -> Option<SessionHandle> {
        match self.api.guest().await {
            Ok(session) => {
                self.observer.log("Using a guest session", Severity::Info);
                Some(SessionHandle::new(GUEST_IDENTIFIER, session))
            }
            Err(e) => {
                self.observer.log(
                    &format!("Could not open a guest session: {}", e),
                    Severity::Critical,
                );
                None
            }
        }
    }
}
