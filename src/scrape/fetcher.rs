//! Single-page search with retry
//!
//! [`PageFetcher::fetch_page`] sends one bounded search request and keeps
//! retrying it in place according to [`decide`]. Retry budgets are tracked per
//! error kind for the page being fetched.

use crate::api::SearchApi;
use crate::config::{Ranking, RetryPolicy};
use crate::observer::{RunObserver, Severity};
use crate::run::RunControl;
use crate::scrape::classify::{decide, ClassifiedError, ErrorKind, RetryDecision};
use crate::session::SessionHandle;
use crate::state::Post;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of one page fetch that did not end in a fatal error
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Normalized posts, newest first; may be empty
    Posts(Vec<Post>),
    /// The page was given up on and counts as empty
    Skipped { reason: String },
    /// Rate-limit budget exhausted; the session should be replaced
    RotateSession(ClassifiedError),
}

pub struct PageFetcher {
    api: Arc<dyn SearchApi>,
    policy: RetryPolicy,
    ranking: Ranking,
    control: Arc<RunControl>,
    observer: Arc<dyn RunObserver>,
}

impl PageFetcher {
    pub fn new(
        api: Arc<dyn SearchApi>,
        policy: RetryPolicy,
        ranking: Ranking,
        control: Arc<RunControl>,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            api,
            policy,
            ranking,
            control,
            observer,
        }
    }

    /// Fetches one page of results for `query`
    ///
    /// # Returns
    ///
    /// * `Ok(PageOutcome)` - Posts, a skipped page, or a rotate-session signal
    /// * `Err(ClassifiedError)` - A fatal error; the session is unusable
    pub async fn fetch_page(
        &self,
        handle: &SessionHandle,
        query: &str,
        page_size: u32,
    ) -> Result<PageOutcome, ClassifiedError> {
        let mut retries: HashMap<ErrorKind, u32> = HashMap::new();

        loop {
            let error = match self
                .api
                .search(&handle.session, query, self.ranking, page_size)
                .await
            {
                Ok(raw) => {
                    let posts: Vec<Post> = raw.iter().filter_map(Post::from_raw).collect();
                    if posts.len() < raw.len() {
                        tracing::debug!(
                            dropped = raw.len() - posts.len(),
                            "Ignored results without a numeric id"
                        );
                    }
                    return Ok(PageOutcome::Posts(posts));
                }
                Err(e) => ClassifiedError::from_api(&e, &handle.identifier),
            };

            let used = retries.entry(error.kind).or_insert(0);
            match decide(error.kind, *used, &self.policy) {
                RetryDecision::RetryAfter(backoff) => {
                    *used += 1;
                    let delay = backoff.sample();
                    self.observer.log(
                        &format!(
                            "{}; retry {} in {}s",
                            error,
                            used,
                            delay.as_secs()
                        ),
                        Severity::Warn,
                    );
                    if !self.control.sleep(delay).await {
                        return Ok(PageOutcome::Skipped {
                            reason: "stop requested during backoff".to_string(),
                        });
                    }
                }
                RetryDecision::Skip => {
                    self.observer
                        .log(&format!("Skipping page: {}", error), Severity::Warn);
                    return Ok(PageOutcome::Skipped {
                        reason: error.to_string(),
                    });
                }
                RetryDecision::RotateSession => {
                    self.observer.log(
                        &format!("Rate limit persists for {}, session must rotate", error.identifier),
                        Severity::Error,
                    );
                    return Ok(PageOutcome::RotateSession(error));
                }
                RetryDecision::Fatal => {
                    self.observer.log(&error.to_string(), Severity::Critical);
                    return Err(error);
                }
            }
        }
    }
}
