//! Walking the time range window by window
//!
//! The scheduler splits `[start, end)` into fixed windows, pages each one
//! through the [`WindowPaginator`], hands the results to the sink and keeps
//! the checkpoint current. When the session dies it pauses the run, asks the
//! control side for another account and waits.

use crate::config::QueryParameters;
use crate::observer::{RunObserver, Severity};
use crate::output::{lock_sink, SharedSink};
use crate::run::{RunControl, RunEvent};
use crate::scrape::classify::ClassifiedError;
use crate::scrape::paginator::{WindowEnd, WindowPaginator};
use crate::session::SessionManager;
use crate::state::{Checkpoint, DedupLedger, Post, RunPhase, Window};
use crate::storage::{ProgressJournal, RunStatus};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Splits `[start, end)` into consecutive windows of `length`
///
/// The last window is cut short at `end`. Returns nothing for an empty range
/// or a non-positive length.
pub fn plan_windows(start: NaiveDateTime, end: NaiveDateTime, length: chrono::Duration) -> Vec<Window> {
    let mut windows = Vec::new();
    if length <= chrono::Duration::zero() {
        return windows;
    }
    let mut since = start;
    while since < end {
        let until = since
            .checked_add_signed(length)
            .map_or(end, |until| until.min(end));
        windows.push(Window::new(since, until));
        since = until;
    }
    windows
}

/// Mutable progress owned by the scheduler
pub struct ScheduleState {
    pub sink: SharedSink,
    pub journal: Box<dyn ProgressJournal + Send>,
    pub ledger: DedupLedger,
}

/// What the scheduler got through
#[derive(Debug, Clone, Default)]
pub struct ScheduleSummary {
    pub windows_completed: u32,
    pub windows_abandoned: u32,
    pub posts_collected: u64,
    /// True if every window was processed
    pub range_finished: bool,
    pub checkpoint: Option<Checkpoint>,
}

pub struct IntervalScheduler {
    params: Arc<QueryParameters>,
    paginator: WindowPaginator,
    sessions: Arc<Mutex<SessionManager>>,
    control: Arc<RunControl>,
    observer: Arc<dyn RunObserver>,
    state: ScheduleState,
    events: mpsc::UnboundedSender<RunEvent>,
}

impl IntervalScheduler {
    pub fn new(
        params: Arc<QueryParameters>,
        paginator: WindowPaginator,
        sessions: Arc<Mutex<SessionManager>>,
        control: Arc<RunControl>,
        observer: Arc<dyn RunObserver>,
        state: ScheduleState,
        events: mpsc::UnboundedSender<RunEvent>,
    ) -> Self {
        Self {
            params,
            paginator,
            sessions,
            control,
            observer,
            state,
            events,
        }
    }

    pub fn journal(&mut self) -> &mut (dyn ProgressJournal + Send) {
        self.state.journal.as_mut()
    }

    /// Processes every window not yet covered by `resume`
    ///
    /// Returns when the range is done or a stop was requested.
    pub async fn run(&mut self, resume: Option<Checkpoint>) -> ScheduleSummary {
        let resume_since = resume.as_ref().map(Checkpoint::next_since);
        let pending: Vec<Window> =
            plan_windows(self.params.start, self.params.end, self.params.window)
                .into_iter()
                .filter(|w| resume_since.map_or(true, |since| w.until > since))
                .collect();

        let mut summary = ScheduleSummary {
            checkpoint: resume,
            ..ScheduleSummary::default()
        };
        if let Some(checkpoint) = &summary.checkpoint {
            self.observer
                .log(&format!("Resuming {}", checkpoint), Severity::Info);
        }

        let total = pending.len();
        let mut interrupted = false;

        'windows: for (index, window) in pending.into_iter().enumerate() {
            self.observer
                .update_status(&format!("Window {}/{}: {}", index + 1, total, window));

            loop {
                if self.control.stop_requested() {
                    interrupted = true;
                    break 'windows;
                }

                let resume_progress = summary
                    .checkpoint
                    .as_ref()
                    .filter(|c| c.matches(window))
                    .and_then(Checkpoint::progress)
                    .cloned();
                if resume_progress.is_none() {
                    let fresh = Checkpoint::begin(window);
                    self.save_checkpoint(&fresh);
                    summary.checkpoint = Some(fresh);
                }

                let outcome = self
                    .paginator
                    .fetch_window(
                        window,
                        resume_progress,
                        &mut self.state.ledger,
                        self.state.journal.as_mut(),
                    )
                    .await;

                summary.posts_collected += outcome.posts.len() as u64;
                self.hand_off(&outcome.posts);
                summary.checkpoint = Some(Checkpoint::InWindow(outcome.progress.clone()));

                match outcome.end {
                    end @ (WindowEnd::Exhausted | WindowEnd::TargetReached | WindowEnd::PageCeiling) => {
                        summary.windows_completed += 1;
                        self.observer.log(
                            &format!(
                                "Window {} done ({}): {} new posts",
                                window, end, outcome.progress.collected
                            ),
                            Severity::Ok,
                        );
                        summary.checkpoint = Some(self.advance(window));
                        break;
                    }
                    WindowEnd::Abandoned(reason) => {
                        summary.windows_abandoned += 1;
                        self.observer.log(
                            &format!("Abandoning window {}: {}", window, reason),
                            Severity::Error,
                        );
                        summary.checkpoint = Some(self.advance(window));
                        break;
                    }
                    WindowEnd::Interrupted => {
                        interrupted = true;
                        break 'windows;
                    }
                    WindowEnd::SessionLost => {
                        self.observer.log(
                            &format!("Session lost in window {}, waiting for a session", window),
                            Severity::Warn,
                        );
                        if !self.await_session().await {
                            interrupted = true;
                            break 'windows;
                        }
                    }
                    WindowEnd::Rotate(err) | WindowEnd::Fatal(err) => {
                        if !self
                            .await_new_account(&err, summary.checkpoint.as_ref())
                            .await
                        {
                            interrupted = true;
                            break 'windows;
                        }
                    }
                }
            }

            if index + 1 < total && !self.control.sleep(self.params.window_delay).await {
                interrupted = true;
                break;
            }
        }

        summary.range_finished = !interrupted;
        summary
    }

    /// Appends posts to the sink and persists it
    fn hand_off(&self, posts: &[Post]) {
        if posts.is_empty() {
            return;
        }
        let (persisted, rows, destination) = {
            let mut sink = lock_sink(&self.state.sink);
            sink.append(posts);
            let persisted = sink.persist();
            (persisted, sink.rows_written(), sink.destination().to_path_buf())
        };
        if !persisted {
            self.observer.log(
                &format!(
                    "Could not persist output to {}; rows stay buffered",
                    destination.display()
                ),
                Severity::Error,
            );
        }
        self.observer.update_output_count(rows);
    }

    /// Marks `window` as finished
    fn advance(&mut self, window: Window) -> Checkpoint {
        let checkpoint = Checkpoint::AtBoundary {
            next_since: window.until,
        };
        self.save_checkpoint(&checkpoint);
        checkpoint
    }

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) {
        if let Err(e) = self.state.journal.save_checkpoint(checkpoint) {
            self.observer
                .log(&format!("Could not save checkpoint: {}", e), Severity::Error);
        }
        self.control.publish_checkpoint(checkpoint.clone());
    }

    fn set_journal_status(&mut self, status: RunStatus) {
        if let Err(e) = self.state.journal.set_status(status) {
            tracing::warn!(status = %status, error = %e, "Failed to record run status");
        }
    }

    /// Holds the run in Paused while a session is being replaced
    ///
    /// Returns false if a stop was requested while waiting.
    async fn await_session(&mut self) -> bool {
        let paused_here = self.control.set_paused(true);
        if let Err(e) = self.control.transition(RunPhase::Paused) {
            tracing::debug!(error = %e, "Run not paused");
        }
        self.observer.update_status("Waiting for session");

        if !self.control.wait_for_session().await {
            return false;
        }
        if paused_here && !self.control.is_awaiting_account() {
            self.control.set_paused(false);
            if let Err(e) = self.control.transition(RunPhase::Running) {
                tracing::debug!(error = %e, "Run not resumed");
            }
            self.observer.update_status("Running");
        }
        true
    }

    /// Pauses the run until the control side supplies a working session
    ///
    /// Returns false if a stop was requested while waiting.
    async fn await_new_account(
        &mut self,
        error: &ClassifiedError,
        checkpoint: Option<&Checkpoint>,
    ) -> bool {
        self.control.set_awaiting_account(true);
        self.control.set_paused(true);
        self.control.set_session_ready(false);
        if let Err(e) = self.control.transition(RunPhase::Paused) {
            tracing::debug!(error = %e, "Run not paused");
        }
        self.sessions.lock().await.clear();
        self.set_journal_status(RunStatus::Paused);

        self.observer.update_status("Awaiting account");
        self.observer.log(
            &format!(
                "Account {} cannot continue ({}); new credentials needed",
                error.identifier, error.message
            ),
            Severity::UserInput,
        );
        let request = RunEvent::CredentialsNeeded {
            checkpoint: checkpoint.cloned(),
            reason: error.to_string(),
        };
        if self.events.send(request).is_err() {
            tracing::warn!("No listener for credential requests");
        }

        if !self.control.wait_for_session().await {
            return false;
        }
        self.set_journal_status(RunStatus::Running);
        true
    }
}
