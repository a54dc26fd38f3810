//! Paging through one time window
//!
//! The paginator walks a window newest-to-oldest by lowering a `max_id`
//! cursor after every page. After each page it records the new identifiers
//! and the updated checkpoint in the run journal, so a resumed run restarts at
//! the page that was next without re-emitting anything.

use crate::config::QueryParameters;
use crate::observer::{RunObserver, Severity};
use crate::run::RunControl;
use crate::scrape::classify::{ClassifiedError, ErrorKind};
use crate::scrape::fetcher::{PageFetcher, PageOutcome};
use crate::scrape::query::build_query;
use crate::session::SessionManager;
use crate::state::{Checkpoint, DedupLedger, Post, PostId, Window, WindowProgress};
use crate::storage::ProgressJournal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Why a window stopped paging
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEnd {
    /// A page brought nothing new
    Exhausted,
    /// The per-window target was reached
    TargetReached,
    /// The page ceiling was hit
    PageCeiling,
    /// Stop was requested
    Interrupted,
    /// The session became unready between pages
    SessionLost,
    /// Rate limiting outlasted the retry budget
    Rotate(ClassifiedError),
    /// The session or account is unusable
    Fatal(ClassifiedError),
    /// An internal failure; the window is given up on
    Abandoned(String),
}

impl fmt::Display for WindowEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("no new posts"),
            Self::TargetReached => f.write_str("target reached"),
            Self::PageCeiling => f.write_str("page ceiling reached"),
            Self::Interrupted => f.write_str("stop requested"),
            Self::SessionLost => f.write_str("session lost"),
            Self::Rotate(err) => write!(f, "session rotation needed ({})", err),
            Self::Fatal(err) => write!(f, "{}", err),
            Self::Abandoned(reason) => write!(f, "abandoned: {}", reason),
        }
    }
}

/// Posts collected in one window and how paging ended
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    /// New posts in the order they were fetched
    pub posts: Vec<Post>,
    /// Progress after the last processed page
    pub progress: WindowProgress,
    pub end: WindowEnd,
}

pub struct WindowPaginator {
    params: Arc<QueryParameters>,
    fetcher: PageFetcher,
    sessions: Arc<Mutex<SessionManager>>,
    control: Arc<RunControl>,
    observer: Arc<dyn RunObserver>,
}

impl WindowPaginator {
    pub fn new(
        params: Arc<QueryParameters>,
        fetcher: PageFetcher,
        sessions: Arc<Mutex<SessionManager>>,
        control: Arc<RunControl>,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            params,
            fetcher,
            sessions,
            control,
            observer,
        }
    }

    /// Pages through `window`, optionally continuing from `resume`
    ///
    /// `resume` is ignored unless it belongs to `window`. Every new post is
    /// added to `ledger` before it is returned.
    pub async fn fetch_window(
        &self,
        window: Window,
        resume: Option<WindowProgress>,
        ledger: &mut DedupLedger,
        journal: &mut dyn ProgressJournal,
    ) -> WindowOutcome {
        let mut progress = match resume.filter(|p| p.window() == window) {
            Some(progress) => {
                self.observer.log(
                    &format!(
                        "Resuming window {} at page {} ({} collected)",
                        window, progress.page_index, progress.collected
                    ),
                    Severity::Info,
                );
                progress
            }
            None => WindowProgress {
                since: window.since,
                until: window.until,
                cursor: None,
                page_index: 0,
                collected: 0,
            },
        };
        let mut posts = Vec::new();
        let end = self
            .page_loop(window, &mut progress, &mut posts, ledger, journal)
            .await;

        tracing::debug!(window = %window, end = %end, new_posts = posts.len(), "Window paging ended");
        WindowOutcome {
            posts,
            progress,
            end,
        }
    }

    async fn page_loop(
        &self,
        window: Window,
        progress: &mut WindowProgress,
        posts: &mut Vec<Post>,
        ledger: &mut DedupLedger,
        journal: &mut dyn ProgressJournal,
    ) -> WindowEnd {
        let params = &self.params;
        let ceiling = params.page_ceiling();

        loop {
            if self.control.stop_requested() {
                return WindowEnd::Interrupted;
            }
            if self.control.is_paused() && !self.control.wait_until_unpaused().await {
                return WindowEnd::Interrupted;
            }
            if !self.control.is_session_ready() {
                return WindowEnd::SessionLost;
            }
            if progress.collected >= params.target_per_window {
                return WindowEnd::TargetReached;
            }
            if progress.page_index >= ceiling {
                return WindowEnd::PageCeiling;
            }

            let handle = {
                let sessions = self.sessions.lock().await;
                sessions.active()
            };
            let Some(handle) = handle else {
                return WindowEnd::Fatal(ClassifiedError::new(
                    ErrorKind::FatalSession,
                    "N/A",
                    "client not available",
                ));
            };

            let query = build_query(
                &params.keywords,
                &params.lang,
                window,
                progress.cursor.as_ref(),
            );
            tracing::debug!(page = progress.page_index, query = %query, "Fetching page");

            let page = match self.fetcher.fetch_page(&handle, &query, params.page_size).await {
                Ok(PageOutcome::Posts(page)) => page,
                Ok(PageOutcome::Skipped { reason }) => {
                    if self.control.stop_requested() {
                        return WindowEnd::Interrupted;
                    }
                    tracing::debug!(reason = %reason, "Skipped page ends the window");
                    return WindowEnd::Exhausted;
                }
                Ok(PageOutcome::RotateSession(err)) => return WindowEnd::Rotate(err),
                Err(err) => return WindowEnd::Fatal(err),
            };

            let received = page.len();
            let mut new_ids = Vec::new();
            for post in page {
                if ledger.insert(post.id.clone()) {
                    new_ids.push(post.id.clone());
                    posts.push(post);
                }
            }

            progress.page_index += 1;
            progress.collected += new_ids.len() as u32;
            let cursor = next_cursor(&new_ids, progress.cursor.as_ref());
            let cursor_exhausted = !new_ids.is_empty() && cursor.is_none();
            if cursor.is_some() {
                progress.cursor = cursor;
            }

            if let Err(reason) = self.record_page(progress, &new_ids, journal) {
                return WindowEnd::Abandoned(reason);
            }

            if new_ids.is_empty() {
                self.observer.log(
                    &format!(
                        "Window {}: page {} brought no new posts ({} received)",
                        window, progress.page_index, received
                    ),
                    Severity::Debug,
                );
                return WindowEnd::Exhausted;
            }
            self.observer.log(
                &format!(
                    "Window {}: page {} brought {} new posts ({} in window)",
                    window,
                    progress.page_index,
                    new_ids.len(),
                    progress.collected
                ),
                Severity::Info,
            );
            if progress.collected >= params.target_per_window {
                return WindowEnd::TargetReached;
            }
            if progress.page_index >= ceiling {
                return WindowEnd::PageCeiling;
            }
            if cursor_exhausted {
                return WindowEnd::Exhausted;
            }

            if !self.control.sleep(params.page_delay).await {
                return WindowEnd::Interrupted;
            }
        }
    }

    fn record_page(
        &self,
        progress: &WindowProgress,
        new_ids: &[PostId],
        journal: &mut dyn ProgressJournal,
    ) -> Result<(), String> {
        let checkpoint = Checkpoint::InWindow(progress.clone());
        journal
            .record_seen(new_ids)
            .map_err(|e| format!("could not record seen posts: {}", e))?;
        journal
            .save_checkpoint(&checkpoint)
            .map_err(|e| format!("could not save checkpoint: {}", e))?;
        self.control.publish_checkpoint(checkpoint);
        Ok(())
    }
}

/// Cursor for the page after one that produced `new_ids`
///
/// One below the oldest new identifier, and always strictly below `previous`.
/// None when there is nothing older to ask for.
pub fn next_cursor(new_ids: &[PostId], previous: Option<&PostId>) -> Option<PostId> {
    let oldest = new_ids.iter().min()?;
    let candidate = oldest.predecessor()?;
    match previous {
        Some(previous) if candidate >= *previous => previous.predecessor(),
        _ => Some(candidate),
    }
}
