//! Scripted in-memory [`SearchApi`] for tests
//!
//! Search and login results are queued up front and handed out in order.
//! Once the search queue is drained every further search returns an empty
//! page, which ends the current window.

use crate::api::{ApiError, ApiSession, Credentials, RawPost, SearchApi};
use crate::config::Ranking;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Builds a raw post with the given id and filler content
pub fn raw_post(id: &str) -> RawPost {
    RawPost {
        id: id.to_string(),
        author_name: Some(format!("author-{}", id)),
        created_at: Some("2024-02-06T00:30:00Z".to_string()),
        text: Some(format!("post {}", id)),
        repost_count: Some(1),
        favorite_count: Some(2),
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    searches: Mutex<VecDeque<Result<Vec<RawPost>, ApiError>>>,
    logins: Mutex<VecDeque<Result<(), ApiError>>>,
    restore_error: Mutex<Option<ApiError>>,
    guest_fails: AtomicBool,
    login_delay: Mutex<Duration>,
    queries: Mutex<Vec<String>>,
    login_identifiers: Mutex<Vec<String>>,
    search_calls: AtomicUsize,
    guest_calls: AtomicUsize,
    restore_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful search page
    pub fn push_page(&self, ids: &[&str]) -> &Self {
        let page = ids.iter().map(|id| raw_post(id)).collect();
        self.push_search(Ok(page))
    }

    /// Queues an arbitrary search outcome
    pub fn push_search(&self, result: Result<Vec<RawPost>, ApiError>) -> &Self {
        lock(&self.searches).push_back(result);
        self
    }

    /// Queues a login outcome; logins succeed when the queue is empty
    pub fn push_login(&self, result: Result<(), ApiError>) -> &Self {
        lock(&self.logins).push_back(result);
        self
    }

    /// Makes every artifact restore fail with `error`
    pub fn fail_restore(&self, error: ApiError) -> &Self {
        *lock(&self.restore_error) = Some(error);
        self
    }

    /// Makes every login take `delay` before answering
    pub fn set_login_delay(&self, delay: Duration) -> &Self {
        *lock(&self.login_delay) = delay;
        self
    }

    pub fn set_guest_fails(&self, fails: bool) -> &Self {
        self.guest_fails.store(fails, Ordering::SeqCst);
        self
    }

    /// Queries sent so far, in order
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    /// Identifiers passed to `login`, in order
    pub fn login_identifiers(&self) -> Vec<String> {
        lock(&self.login_identifiers).clone()
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn guest_calls(&self) -> usize {
        self.guest_calls.load(Ordering::SeqCst)
    }

    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    pub fn pending_searches(&self) -> usize {
        lock(&self.searches).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SearchApi for ScriptedApi {
    async fn login(&self, credentials: &Credentials) -> Result<ApiSession, ApiError> {
        lock(&self.login_identifiers).push(credentials.identifier.clone());
        let delay = *lock(&self.login_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let outcome = lock(&self.logins).pop_front().unwrap_or(Ok(()));
        outcome.map(|()| {
            let mut cookies = BTreeMap::new();
            cookies.insert(
                "auth_token".to_string(),
                format!("token-{}", credentials.identifier),
            );
            ApiSession {
                account: credentials.identifier.clone(),
                guest: false,
                cookies,
            }
        })
    }

    async fn guest(&self) -> Result<ApiSession, ApiError> {
        self.guest_calls.fetch_add(1, Ordering::SeqCst);
        if self.guest_fails.load(Ordering::SeqCst) {
            return Err(ApiError::Forbidden("guest access disabled".to_string()));
        }
        Ok(ApiSession {
            account: "guest".to_string(),
            guest: true,
            cookies: BTreeMap::new(),
        })
    }

    async fn restore(&self, session: ApiSession) -> Result<ApiSession, ApiError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        let error = lock(&self.restore_error).clone();
        match error {
            Some(error) => Err(error),
            None => Ok(session),
        }
    }

    async fn search(
        &self,
        _session: &ApiSession,
        query: &str,
        _ranking: Ranking,
        _count: u32,
    ) -> Result<Vec<RawPost>, ApiError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queries).push(query.to_string());
        let next = lock(&self.searches).pop_front();
        next.unwrap_or(Ok(Vec::new()))
    }
}
