//! Run coordinator: the control surface of a run
//!
//! [`RunCoordinator`] wires the scraping components together, starts the
//! worker thread and forwards control requests to it. Lifecycle:
//!
//! ```text
//! Idle -> Initializing -> Running <-> Paused -> Stopping -> Finished
//! ```

use crate::api::{Credentials, SearchApi};
use crate::config::{QueryParameters, RetryPolicy};
use crate::observer::RunObserver;
use crate::output::{share_sink, OutputSink};
use crate::run::control::RunControl;
use crate::run::report::RunReport;
use crate::run::worker::{Command, Worker};
use crate::scrape::{IntervalScheduler, PageFetcher, ScheduleState, WindowPaginator};
use crate::session::{SessionManager, SessionStore};
use crate::state::{Checkpoint, RunPhase};
use crate::storage::{ProgressJournal, ResumePoint};
use crate::{ConfigError, TrawlError};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, Mutex};

/// Notifications from the worker to the control side
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The session died; the run is paused until `switch_account` succeeds
    CredentialsNeeded {
        checkpoint: Option<Checkpoint>,
        reason: String,
    },
    AccountSwitched { identifier: String },
    /// A requested switch could not establish a session
    SwitchFailed { identifier: String },
    /// The run is over; always the last event
    Finished(RunReport),
}

/// Result of a resume request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    /// No active session; switch accounts first
    AwaitingAccount,
}

/// Everything a run needs from the outside
pub struct RunDependencies {
    pub api: Arc<dyn SearchApi>,
    pub session_store: SessionStore,
    pub sink: Box<dyn OutputSink>,
    pub journal: Box<dyn ProgressJournal + Send>,
    pub observer: Arc<dyn RunObserver>,
    pub resume: ResumePoint,
}

/// Cloneable handle for sending control requests to a running run
#[derive(Clone)]
pub struct RunHandle {
    control: Arc<RunControl>,
    commands: mpsc::UnboundedSender<Command>,
}

impl RunHandle {
    fn ensure_running(&self) -> Result<(), TrawlError> {
        if self.control.is_running() {
            Ok(())
        } else {
            Err(TrawlError::NotActive(format!(
                "run is {}",
                self.control.phase()
            )))
        }
    }

    fn send(&self, command: Command) -> Result<(), TrawlError> {
        self.ensure_running()?;
        self.commands
            .send(command)
            .map_err(|_| TrawlError::NotActive("worker has exited".to_string()))
    }

    /// Pauses at the next page boundary
    pub fn pause(&self) -> Result<(), TrawlError> {
        self.send(Command::Pause)
    }

    /// Resumes a paused run
    ///
    /// A run that lost its session stays paused and reports
    /// [`ResumeOutcome::AwaitingAccount`].
    pub fn resume(&self) -> Result<ResumeOutcome, TrawlError> {
        self.ensure_running()?;
        if self.control.is_awaiting_account() || !self.control.is_session_ready() {
            return Ok(ResumeOutcome::AwaitingAccount);
        }
        self.send(Command::Resume)?;
        Ok(ResumeOutcome::Resumed)
    }

    /// Requests a cooperative stop; every wait in the worker wakes at once
    pub fn stop(&self) -> Result<(), TrawlError> {
        self.control.request_stop();
        self.send(Command::Stop)
    }

    /// Replaces the session; `None` asks for a guest session
    pub fn switch_account(&self, credentials: Option<Credentials>) -> Result<(), TrawlError> {
        self.send(Command::SwitchAccount(credentials))
    }

    /// Persists the sink now
    pub fn save_now(&self) -> Result<(), TrawlError> {
        self.send(Command::SaveNow)
    }

    pub fn phase(&self) -> RunPhase {
        self.control.phase()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.control.checkpoint()
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }
}

struct PendingRun {
    deps: RunDependencies,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<RunEvent>,
}

/// Owns one run from start to join
pub struct RunCoordinator {
    params: Arc<QueryParameters>,
    policy: RetryPolicy,
    control: Arc<RunControl>,
    handle: RunHandle,
    events: mpsc::UnboundedReceiver<RunEvent>,
    pending: Option<PendingRun>,
    worker: Option<thread::JoinHandle<RunReport>>,
}

impl RunCoordinator {
    pub fn new(params: QueryParameters, policy: RetryPolicy, deps: RunDependencies) -> Self {
        let control = Arc::new(RunControl::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            params: Arc::new(params),
            policy,
            handle: RunHandle {
                control: Arc::clone(&control),
                commands: command_tx,
            },
            control,
            events: event_rx,
            pending: Some(PendingRun {
                deps,
                commands: command_rx,
                events: event_tx,
            }),
            worker: None,
        }
    }

    /// Starts the worker thread
    ///
    /// Invalid parameters fail closed: the run goes straight to Finished and
    /// the error is returned.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Account to start with; `None` for a guest session
    pub fn start(&mut self, credentials: Option<Credentials>) -> Result<(), TrawlError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| TrawlError::Worker("run already started".to_string()))?;

        if let Err(e) = validate_parameters(&self.params) {
            self.control.transition(RunPhase::Initializing)?;
            self.control.transition(RunPhase::Finished)?;
            return Err(e.into());
        }

        let PendingRun {
            deps,
            commands,
            events,
        } = pending;
        let RunDependencies {
            api,
            session_store,
            sink,
            journal,
            observer,
            resume,
        } = deps;

        let sessions = Arc::new(Mutex::new(SessionManager::new(
            Arc::clone(&api),
            session_store,
            self.policy.clone(),
            Arc::clone(&self.control),
            Arc::clone(&observer),
        )));
        let fetcher = PageFetcher::new(
            api,
            self.policy.clone(),
            self.params.ranking,
            Arc::clone(&self.control),
            Arc::clone(&observer),
        );
        let paginator = WindowPaginator::new(
            Arc::clone(&self.params),
            fetcher,
            Arc::clone(&sessions),
            Arc::clone(&self.control),
            Arc::clone(&observer),
        );
        let sink = share_sink(sink);
        let scheduler = IntervalScheduler::new(
            Arc::clone(&self.params),
            paginator,
            Arc::clone(&sessions),
            Arc::clone(&self.control),
            Arc::clone(&observer),
            ScheduleState {
                sink: Arc::clone(&sink),
                journal,
                ledger: resume.ledger,
            },
            events.clone(),
        );

        let worker = Worker {
            params: Arc::clone(&self.params),
            control: Arc::clone(&self.control),
            observer,
            sessions,
            sink,
            scheduler,
            resume: resume.checkpoint,
            credentials,
            events,
        };

        self.control.set_running(true);
        match worker.spawn(commands) {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.control.set_running(false);
                Err(TrawlError::Io(e))
            }
        }
    }

    /// A cloneable control handle
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn pause(&self) -> Result<(), TrawlError> {
        self.handle.pause()
    }

    pub fn resume(&self) -> Result<ResumeOutcome, TrawlError> {
        self.handle.resume()
    }

    pub fn stop(&self) -> Result<(), TrawlError> {
        self.handle.stop()
    }

    pub fn switch_account(&self, credentials: Option<Credentials>) -> Result<(), TrawlError> {
        self.handle.switch_account(credentials)
    }

    pub fn save_now(&self) -> Result<(), TrawlError> {
        self.handle.save_now()
    }

    pub fn phase(&self) -> RunPhase {
        self.control.phase()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.control.checkpoint()
    }

    pub fn params(&self) -> &QueryParameters {
        &self.params
    }

    /// Next event from the worker; None once the worker is gone
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Waits for the worker thread and returns its report
    ///
    /// Blocks the calling thread; call it once `Finished` has been received
    /// or after `stop`.
    pub fn join(mut self) -> Result<RunReport, TrawlError> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| TrawlError::NotActive("run was never started".to_string()))?;
        worker
            .join()
            .map_err(|_| TrawlError::Worker("worker thread panicked".to_string()))
    }
}

impl Drop for RunCoordinator {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.control.request_stop();
        }
    }
}

fn validate_parameters(params: &QueryParameters) -> Result<(), ConfigError> {
    if params.start >= params.end {
        return Err(ConfigError::Validation(format!(
            "start ({}) must be before end ({})",
            params.start, params.end
        )));
    }
    if params.window <= chrono::Duration::zero() {
        return Err(ConfigError::Validation(
            "window length must be positive".to_string(),
        ));
    }
    if params.page_size == 0 || params.target_per_window == 0 {
        return Err(ConfigError::Validation(
            "page size and per-window target must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedApi;
    use crate::config::Ranking;
    use crate::observer::RecordingObserver;
    use crate::output::SqliteTableSink;
    use crate::storage::{RunJournal, SqliteStorage};
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::TempDir;

    fn params(start_hour: u32, end_hour: u32) -> QueryParameters {
        let day = NaiveDate::from_ymd_opt(2024, 2, 6).unwrap();
        QueryParameters {
            keywords: "quake".to_string(),
            lang: "en".to_string(),
            ranking: Ranking::Latest,
            start: day.and_hms_opt(start_hour, 0, 0).unwrap(),
            end: day.and_hms_opt(end_hour, 0, 0).unwrap(),
            window: chrono::Duration::hours(1),
            target_per_window: 10,
            page_size: 20,
            page_delay: Duration::ZERO,
            window_delay: Duration::ZERO,
            destination: "out.db".to_string(),
        }
    }

    fn deps(dir: &TempDir) -> RunDependencies {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let (journal, resume) = RunJournal::open(storage, "hash", false).unwrap();
        RunDependencies {
            api: Arc::new(ScriptedApi::new()),
            session_store: SessionStore::new(dir.path().join("sessions")),
            sink: Box::new(SqliteTableSink::open(dir.path().join("out.db"))),
            journal: Box::new(journal),
            observer: Arc::new(RecordingObserver::new()),
            resume,
        }
    }

    #[test]
    fn test_invalid_range_fails_closed() {
        let dir = TempDir::new().unwrap();
        let mut coordinator =
            RunCoordinator::new(params(2, 1), RetryPolicy::immediate(), deps(&dir));

        let result = coordinator.start(None);
        assert!(matches!(result, Err(TrawlError::Config(_))));
        assert_eq!(coordinator.phase(), RunPhase::Finished);
        assert!(coordinator.start(None).is_err());
    }

    #[test]
    fn test_commands_rejected_before_start() {
        let dir = TempDir::new().unwrap();
        let coordinator = RunCoordinator::new(params(0, 1), RetryPolicy::immediate(), deps(&dir));

        assert!(matches!(coordinator.pause(), Err(TrawlError::NotActive(_))));
        assert!(matches!(
            coordinator.switch_account(None),
            Err(TrawlError::NotActive(_))
        ));
        assert_eq!(coordinator.phase(), RunPhase::Idle);
    }

    #[test]
    fn test_join_without_start() {
        let dir = TempDir::new().unwrap();
        let coordinator = RunCoordinator::new(params(0, 1), RetryPolicy::immediate(), deps(&dir));
        assert!(matches!(coordinator.join(), Err(TrawlError::NotActive(_))));
    }
}
