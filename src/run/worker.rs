//! Worker thread
//!
//! The worker owns a single-threaded tokio runtime. Two tasks share it on a
//! `LocalSet`: the scheduler, and a command loop applying requests from the
//! control side. The ledger, checkpoint and sink are only touched here.

use crate::api::Credentials;
use crate::config::QueryParameters;
use crate::observer::{RunObserver, Severity};
use crate::output::{lock_sink, SharedSink};
use crate::run::control::RunControl;
use crate::run::coordinator::RunEvent;
use crate::run::report::{RunOutcome, RunReport};
use crate::scrape::{IntervalScheduler, ScheduleSummary};
use crate::session::SessionManager;
use crate::state::{Checkpoint, RunPhase};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, Mutex};
use tokio::task::LocalSet;

/// Requests sent from the control side to the worker
#[derive(Debug)]
pub(crate) enum Command {
    Pause,
    Resume,
    Stop,
    SwitchAccount(Option<Credentials>),
    SaveNow,
}

pub(crate) struct Worker {
    pub params: Arc<QueryParameters>,
    pub control: Arc<RunControl>,
    pub observer: Arc<dyn RunObserver>,
    pub sessions: Arc<Mutex<SessionManager>>,
    pub sink: SharedSink,
    pub scheduler: IntervalScheduler,
    pub resume: Option<Checkpoint>,
    pub credentials: Option<Credentials>,
    pub events: mpsc::UnboundedSender<RunEvent>,
}

impl Worker {
    /// Starts the worker thread
    pub fn spawn(
        self,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> std::io::Result<thread::JoinHandle<RunReport>> {
        thread::Builder::new()
            .name("search-trawl-worker".to_string())
            .spawn(move || self.block_on(commands))
    }

    fn block_on(self, commands: mpsc::UnboundedReceiver<Command>) -> RunReport {
        let started_at = Utc::now();
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                self.observer.log(
                    &format!("Could not start the worker runtime: {}", e),
                    Severity::Critical,
                );
                let summary = ScheduleSummary {
                    checkpoint: self.resume.clone(),
                    ..ScheduleSummary::default()
                };
                return self.finish(started_at, RunOutcome::Failed, summary);
            }
        };

        let local = LocalSet::new();
        local.block_on(&runtime, self.run(started_at, commands))
    }

    async fn run(
        mut self,
        started_at: DateTime<Utc>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> RunReport {
        let context = CommandContext {
            control: Arc::clone(&self.control),
            observer: Arc::clone(&self.observer),
            sessions: Arc::clone(&self.sessions),
            sink: Arc::clone(&self.sink),
            events: self.events.clone(),
        };
        let command_task = tokio::task::spawn_local(command_loop(commands, context));

        let (outcome, summary) = self.drive().await;

        command_task.abort();
        let _ = command_task.await;
        self.finish(started_at, outcome, summary)
    }

    /// Initializes the session, then runs the scheduler
    async fn drive(&mut self) -> (RunOutcome, ScheduleSummary) {
        let idle = ScheduleSummary {
            checkpoint: self.resume.clone(),
            ..ScheduleSummary::default()
        };

        // Initialize
        if let Err(e) = self.control.transition(RunPhase::Initializing) {
            tracing::warn!(error = %e, "Unexpected phase at start");
        }
        self.observer.update_status("Initializing");
        let credentials = self.credentials.take();
        let ready = {
            let mut sessions = self.sessions.lock().await;
            sessions.ensure_session(credentials.as_ref()).await
        };
        if !ready {
            self.observer
                .log("No session could be established", Severity::Critical);
            return (RunOutcome::Failed, idle);
        }
        if self.control.stop_requested() {
            return (RunOutcome::Stopped, idle);
        }

        // Run
        if let Err(e) = self.control.transition(RunPhase::Running) {
            tracing::warn!(error = %e, "Run could not enter Running");
            return (RunOutcome::Stopped, idle);
        }
        self.observer.update_status("Running");
        self.observer.log(
            &format!(
                "Searching {} ({} to {})",
                self.params.keywords, self.params.start, self.params.end
            ),
            Severity::Info,
        );

        let summary = self.scheduler.run(self.resume.take()).await;
        let outcome = if summary.range_finished {
            RunOutcome::Completed
        } else {
            RunOutcome::Stopped
        };
        (outcome, summary)
    }

    /// Persists the sink, closes the journal and reports
    fn finish(
        mut self,
        started_at: DateTime<Utc>,
        outcome: RunOutcome,
        summary: ScheduleSummary,
    ) -> RunReport {
        if let Err(e) = self.control.transition(RunPhase::Stopping) {
            tracing::debug!(error = %e, "Skipping Stopping phase");
        }
        self.observer.update_status("Stopping");

        let (persisted, rows_written, destination) = {
            let mut sink = lock_sink(&self.sink);
            let persisted = sink.persist();
            (persisted, sink.rows_written(), sink.destination().to_path_buf())
        };
        if !persisted {
            self.observer.log(
                &format!("Final save to {} failed", destination.display()),
                Severity::Error,
            );
        }
        self.observer.update_output_count(rows_written);

        if let Err(e) = self.scheduler.journal().finish(outcome.journal_status()) {
            self.observer
                .log(&format!("Could not close the run journal: {}", e), Severity::Error);
        }

        let last_account = match self.sessions.try_lock() {
            Ok(sessions) => sessions.identifier().to_string(),
            Err(_) => "N/A".to_string(),
        };

        if let Err(e) = self.control.transition(RunPhase::Finished) {
            tracing::warn!(error = %e, "Run could not enter Finished");
        }
        self.control.set_running(false);

        let report = RunReport {
            outcome,
            started_at,
            finished_at: Utc::now(),
            windows_completed: summary.windows_completed,
            windows_abandoned: summary.windows_abandoned,
            posts_collected: summary.posts_collected,
            rows_written,
            persisted,
            final_checkpoint: summary.checkpoint,
            destination,
            last_account,
        };

        let severity = match outcome {
            RunOutcome::Completed => Severity::Ok,
            RunOutcome::Stopped => Severity::Info,
            RunOutcome::Failed => Severity::Critical,
        };
        self.observer.update_status(&format!("Finished ({})", outcome));
        self.observer.log(
            &format!(
                "Run {}: {} new posts, {} rows in {}",
                outcome,
                report.posts_collected,
                report.rows_written,
                report.destination.display()
            ),
            severity,
        );
        if self.events.send(RunEvent::Finished(report.clone())).is_err() {
            tracing::debug!("Run finished with nobody listening");
        }
        report
    }
}

struct CommandContext {
    control: Arc<RunControl>,
    observer: Arc<dyn RunObserver>,
    sessions: Arc<Mutex<SessionManager>>,
    sink: SharedSink,
    events: mpsc::UnboundedSender<RunEvent>,
}

impl CommandContext {
    fn transition(&self, to: RunPhase) {
        if let Err(e) = self.control.transition(to) {
            tracing::debug!(error = %e, "Phase unchanged");
        }
    }

    fn emit(&self, event: RunEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Run event dropped");
        }
    }

    fn pause(&self) {
        if self.control.phase() != RunPhase::Running {
            tracing::debug!(phase = %self.control.phase(), "Pause ignored");
            return;
        }
        self.control.set_paused(true);
        self.transition(RunPhase::Paused);
        self.observer.update_status("Paused");
        self.observer
            .log("Paused; takes effect at the next page", Severity::Info);
    }

    fn resume(&self) {
        if self.control.phase() != RunPhase::Paused {
            tracing::debug!(phase = %self.control.phase(), "Resume ignored");
            return;
        }
        if self.control.is_awaiting_account() || !self.control.is_session_ready() {
            self.observer.update_status("Awaiting account");
            self.observer
                .log("Cannot resume without an active session", Severity::UserInput);
            return;
        }
        self.control.set_paused(false);
        self.transition(RunPhase::Running);
        self.observer.update_status("Running");
        self.observer.log("Resumed", Severity::Info);
    }

    fn stop(&self) {
        self.control.request_stop();
        self.transition(RunPhase::Stopping);
        self.observer.update_status("Stopping");
        self.observer.log("Stop requested", Severity::Info);
    }

    async fn switch_account(&self, credentials: Option<Credentials>) {
        if self.control.stop_requested() {
            return;
        }
        let identifier = credentials
            .as_ref()
            .map(|c| c.identifier.clone())
            .unwrap_or_else(|| crate::session::GUEST_IDENTIFIER.to_string());

        let switched = {
            let mut sessions = self.sessions.lock().await;
            sessions.switch(credentials.as_ref()).await
        };

        if switched {
            self.emit(RunEvent::AccountSwitched {
                identifier: identifier.clone(),
            });
            if self.control.is_awaiting_account() {
                self.control.set_awaiting_account(false);
                self.control.set_paused(false);
                self.transition(RunPhase::Running);
                self.observer.update_status("Running");
            }
            self.observer
                .log(&format!("Now using {}", identifier), Severity::Ok);
        } else {
            self.control.set_awaiting_account(true);
            if self.control.phase() == RunPhase::Running {
                self.control.set_paused(true);
                self.transition(RunPhase::Paused);
            }
            self.observer.update_status("Awaiting account");
            self.observer.log(
                &format!("Switching to {} failed", identifier),
                Severity::UserInput,
            );
            self.emit(RunEvent::SwitchFailed { identifier });
        }
    }

    fn save_now(&self) {
        let (persisted, rows) = {
            let mut sink = lock_sink(&self.sink);
            (sink.persist(), sink.rows_written())
        };
        self.observer.update_output_count(rows);
        if persisted {
            self.observer
                .log(&format!("Saved {} rows", rows), Severity::Ok);
        } else {
            self.observer.log("Save failed", Severity::Error);
        }
    }
}

async fn command_loop(mut commands: mpsc::UnboundedReceiver<Command>, context: CommandContext) {
    while let Some(command) = commands.recv().await {
        tracing::debug!(?command, "Run command");
        match command {
            Command::Pause => context.pause(),
            Command::Resume => context.resume(),
            Command::Stop => context.stop(),
            Command::SwitchAccount(credentials) => context.switch_account(credentials).await,
            Command::SaveNow => context.save_now(),
        }
    }
    // every control handle is gone
    context.control.request_stop();
}
