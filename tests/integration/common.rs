//! Shared fixtures for run tests

use chrono::{NaiveDate, NaiveDateTime};
use search_trawl::api::ScriptedApi;
use search_trawl::config::{QueryParameters, Ranking, RetryPolicy};
use search_trawl::observer::RecordingObserver;
use search_trawl::output::SqliteTableSink;
use search_trawl::run::{RunDependencies, RunReport};
use search_trawl::session::SessionStore;
use search_trawl::storage::{ProgressJournal, ResumePoint, RunJournal, SqliteStorage};
use search_trawl::{RunCoordinator, RunEvent, RunPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const QUERY_HASH: &str = "integration-query";

/// How long any single event may take to arrive
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 2, 6)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Parameters for `hours` one-hour windows starting at midnight
pub fn params(hours: u32) -> QueryParameters {
    QueryParameters {
        keywords: "(\"quake\" OR \"tremor\")".to_string(),
        lang: "en".to_string(),
        ranking: Ranking::Latest,
        start: at(0),
        end: at(hours),
        window: chrono::Duration::hours(1),
        target_per_window: 50,
        page_size: 20,
        page_delay: Duration::ZERO,
        window_delay: Duration::ZERO,
        destination: "posts.db".to_string(),
    }
}

/// Temporary files plus the fakes a run talks to
pub struct Harness {
    pub dir: TempDir,
    pub api: Arc<ScriptedApi>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            api: Arc::new(ScriptedApi::new()),
            observer: Arc::new(RecordingObserver::new()),
        }
    }

    /// Same files, fresh fakes; models a second invocation
    pub fn restart(self) -> Self {
        Self {
            dir: self.dir,
            api: Arc::new(ScriptedApi::new()),
            observer: Arc::new(RecordingObserver::new()),
        }
    }

    pub fn destination(&self) -> PathBuf {
        self.dir.path().join("posts.db")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.db")
    }

    pub fn storage(&self) -> SqliteStorage {
        SqliteStorage::new(&self.state_path()).unwrap()
    }

    /// Builds a coordinator over this harness, resuming unless `fresh`
    pub fn coordinator(&self, params: QueryParameters, fresh: bool) -> RunCoordinator {
        let (journal, resume) = RunJournal::open(self.storage(), QUERY_HASH, fresh).unwrap();
        self.coordinator_with_journal(params, Box::new(journal), resume)
    }

    /// Builds a coordinator that records progress in `journal`
    pub fn coordinator_with_journal(
        &self,
        params: QueryParameters,
        journal: Box<dyn ProgressJournal + Send>,
        resume: ResumePoint,
    ) -> RunCoordinator {
        let deps = RunDependencies {
            api: self.api.clone(),
            session_store: SessionStore::new(self.dir.path().join("sessions")),
            sink: Box::new(SqliteTableSink::open(self.destination())),
            journal,
            observer: self.observer.clone(),
            resume,
        };
        RunCoordinator::new(params, RetryPolicy::immediate(), deps)
    }
}

/// Next run event, failing the test if none arrives in time
pub async fn next_event(coordinator: &mut RunCoordinator) -> RunEvent {
    tokio::time::timeout(EVENT_TIMEOUT, coordinator.next_event())
        .await
        .expect("timed out waiting for a run event")
        .expect("event channel closed early")
}

/// Waits for `Finished`, failing on any other event
pub async fn expect_finished(coordinator: &mut RunCoordinator) -> RunReport {
    match next_event(coordinator).await {
        RunEvent::Finished(report) => report,
        other => panic!("expected Finished, got {:?}", other),
    }
}

/// Polls until the run reaches `phase`
pub async fn wait_for_phase(coordinator: &RunCoordinator, phase: RunPhase) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while coordinator.phase() != phase {
        assert!(
            tokio::time::Instant::now() < deadline,
            "run never reached {:?} (now {:?})",
            phase,
            coordinator.phase()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
