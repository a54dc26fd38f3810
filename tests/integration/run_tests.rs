//! End-to-end runs through the coordinator

use crate::common::{at, expect_finished, next_event, params, wait_for_phase, Harness};
use search_trawl::api::{ApiError, Credentials};
use search_trawl::observer::Severity;
use search_trawl::output::load_rows;
use search_trawl::run::{ResumeOutcome, RunOutcome};
use search_trawl::storage::{
    ProgressJournal, ResumePoint, RunStatus, Storage, StorageError, StorageResult,
};
use search_trawl::{Checkpoint, PostId, RunEvent, RunPhase};
use std::time::Duration;

fn alice() -> Option<Credentials> {
    Some(Credentials::new("alice", "pw"))
}

fn id(raw: &str) -> PostId {
    PostId::parse(raw).unwrap()
}

#[tokio::test]
async fn test_full_run_collects_every_window() {
    let harness = Harness::new();
    harness
        .api
        .push_page(&["30", "29"])
        .push_page(&[])
        .push_page(&["20", "19", "18"]);

    let mut coordinator = harness.coordinator(params(2), true);
    coordinator.start(alice()).unwrap();
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.windows_completed, 2);
    assert_eq!(report.windows_abandoned, 0);
    assert_eq!(report.posts_collected, 5);
    assert_eq!(report.rows_written, 5);
    assert!(report.persisted);
    assert_eq!(report.last_account, "alice");
    assert_eq!(
        report.final_checkpoint,
        Some(Checkpoint::AtBoundary { next_since: at(2) })
    );
    assert_eq!(coordinator.phase(), RunPhase::Finished);

    let queries = harness.api.queries();
    assert_eq!(queries.len(), 4);
    assert!(queries[0].contains("since:2024-02-06_00:00:00_UTC until:2024-02-06_01:00:00_UTC"));
    assert!(queries[1].ends_with("max_id:28"));
    assert!(queries[2].contains("since:2024-02-06_01:00:00_UTC"));
    assert!(!queries[2].contains("max_id"));

    let rows = load_rows(&harness.destination()).unwrap();
    let sequences: Vec<u64> = rows.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    assert_eq!(rows[0].body, "post 30");

    let latest = harness.storage().get_latest_run().unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Completed);
    assert_eq!(harness.observer.last_row_count(), Some(5));

    let report = coordinator.join().unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn test_fatal_mid_window_pauses_for_new_account() {
    let harness = Harness::new();
    harness
        .api
        .push_page(&["30", "29"])
        .push_search(Err(ApiError::Unauthorized("token revoked".into())));

    let mut coordinator = harness.coordinator(params(1), true);
    coordinator.start(alice()).unwrap();

    let checkpoint = match next_event(&mut coordinator).await {
        RunEvent::CredentialsNeeded { checkpoint, reason } => {
            assert!(reason.contains("alice"), "reason: {}", reason);
            checkpoint.expect("checkpoint should travel with the request")
        }
        other => panic!("expected CredentialsNeeded, got {:?}", other),
    };
    let progress = checkpoint.progress().expect("in-window checkpoint").clone();
    assert_eq!(progress.since, at(0));
    assert_eq!(progress.until, at(1));
    assert_eq!(progress.cursor, Some(id("28")));
    assert_eq!(progress.collected, 2);

    assert_eq!(coordinator.phase(), RunPhase::Paused);
    assert_eq!(coordinator.checkpoint(), Some(checkpoint));
    assert_eq!(coordinator.resume().unwrap(), ResumeOutcome::AwaitingAccount);

    harness.api.push_page(&["27"]);
    coordinator
        .switch_account(Some(Credentials::new("bob", "pw")))
        .unwrap();

    match next_event(&mut coordinator).await {
        RunEvent::AccountSwitched { identifier } => assert_eq!(identifier, "bob"),
        other => panic!("expected AccountSwitched, got {:?}", other),
    }
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.posts_collected, 3);
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.last_account, "bob");
    assert_eq!(harness.api.login_identifiers(), vec!["alice", "bob"]);

    let queries = harness.api.queries();
    assert!(queries[2].ends_with("max_id:28"), "resumed query: {}", queries[2]);
}

#[tokio::test]
async fn test_failed_switch_keeps_waiting() {
    let harness = Harness::new();
    harness
        .api
        .push_search(Err(ApiError::Api("account suspended".into())));

    let mut coordinator = harness.coordinator(params(1), true);
    coordinator.start(alice()).unwrap();
    assert!(matches!(
        next_event(&mut coordinator).await,
        RunEvent::CredentialsNeeded { .. }
    ));

    harness
        .api
        .push_login(Err(ApiError::Forbidden("bad password".into())))
        .push_login(Err(ApiError::Forbidden("bad password".into())));
    coordinator
        .switch_account(Some(Credentials::new("bob", "wrong")))
        .unwrap();

    match next_event(&mut coordinator).await {
        RunEvent::SwitchFailed { identifier } => assert_eq!(identifier, "bob"),
        other => panic!("expected SwitchFailed, got {:?}", other),
    }
    assert_eq!(coordinator.phase(), RunPhase::Paused);
    assert_eq!(coordinator.resume().unwrap(), ResumeOutcome::AwaitingAccount);

    coordinator
        .switch_account(Some(Credentials::new("carol", "pw")))
        .unwrap();
    assert!(matches!(
        next_event(&mut coordinator).await,
        RunEvent::AccountSwitched { .. }
    ));
    let report = expect_finished(&mut coordinator).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.last_account, "carol");
}

#[tokio::test]
async fn test_stop_while_awaiting_account() {
    let harness = Harness::new();
    harness
        .api
        .push_page(&["30", "29"])
        .push_search(Err(ApiError::AccountLocked("locked".into())));

    let mut coordinator = harness.coordinator(params(2), true);
    coordinator.start(alice()).unwrap();
    assert!(matches!(
        next_event(&mut coordinator).await,
        RunEvent::CredentialsNeeded { .. }
    ));

    coordinator.stop().unwrap();
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(report.rows_written, 2);
    assert!(report.persisted);
    assert!(matches!(report.final_checkpoint, Some(Checkpoint::InWindow(_))));
    assert_eq!(coordinator.phase(), RunPhase::Finished);

    let latest = harness.storage().get_latest_run().unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Interrupted);
    assert!(matches!(coordinator.pause(), Err(search_trawl::TrawlError::NotActive(_))));
}

#[tokio::test]
async fn test_resume_does_not_reemit_seen_posts() {
    // First invocation dies mid-window and is stopped
    let harness = Harness::new();
    harness
        .api
        .push_page(&["30", "29"])
        .push_search(Err(ApiError::Unauthorized("revoked".into())));
    let mut first = harness.coordinator(params(2), true);
    first.start(alice()).unwrap();
    assert!(matches!(
        next_event(&mut first).await,
        RunEvent::CredentialsNeeded { .. }
    ));
    first.stop().unwrap();
    let report = expect_finished(&mut first).await;
    assert_eq!(report.outcome, RunOutcome::Stopped);
    drop(first);

    // Second invocation picks the same run up again
    let harness = harness.restart();
    harness.api.push_page(&["29", "27"]).push_page(&[]);
    let mut second = harness.coordinator(params(2), false);
    second.start(alice()).unwrap();
    let report = expect_finished(&mut second).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.posts_collected, 1);
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.windows_completed, 2);

    let queries = harness.api.queries();
    assert!(queries[0].ends_with("max_id:28"), "first query: {}", queries[0]);

    let bodies: Vec<String> = load_rows(&harness.destination())
        .unwrap()
        .into_iter()
        .map(|r| r.body)
        .collect();
    assert_eq!(bodies, vec!["post 30", "post 29", "post 27"]);

    // the saved session was reused rather than logging in again
    assert!(harness.api.login_identifiers().is_empty());
    assert_eq!(harness.api.restore_calls(), 1);
}

#[tokio::test]
async fn test_pause_holds_the_worker() {
    let harness = Harness::new();
    for n in 0..5 {
        let id = (100 - n).to_string();
        harness.api.push_page(&[id.as_str()]);
    }
    let mut slow = params(1);
    slow.page_delay = Duration::from_millis(200);

    let mut coordinator = harness.coordinator(slow, true);
    coordinator.start(alice()).unwrap();
    wait_for_phase(&coordinator, RunPhase::Running).await;

    coordinator.pause().unwrap();
    wait_for_phase(&coordinator, RunPhase::Paused).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    let calls = harness.api.search_calls();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(harness.api.search_calls(), calls);
    assert!(calls < 6);

    assert_eq!(coordinator.resume().unwrap(), ResumeOutcome::Resumed);
    let report = expect_finished(&mut coordinator).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.posts_collected, 5);
}

#[tokio::test]
async fn test_no_session_fails_closed() {
    let harness = Harness::new();
    harness.api.set_guest_fails(true);

    let mut coordinator = harness.coordinator(params(1), true);
    coordinator.start(None).unwrap();
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.posts_collected, 0);
    assert_eq!(harness.api.search_calls(), 0);
    assert_eq!(coordinator.phase(), RunPhase::Finished);

    let latest = harness.storage().get_latest_run().unwrap().unwrap();
    assert_eq!(latest.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_save_now_persists_on_demand() {
    let harness = Harness::new();
    harness.api.push_search(Err(ApiError::Unauthorized("revoked".into())));

    let mut coordinator = harness.coordinator(params(1), true);
    coordinator.start(alice()).unwrap();
    assert!(matches!(
        next_event(&mut coordinator).await,
        RunEvent::CredentialsNeeded { .. }
    ));

    coordinator.save_now().unwrap();
    coordinator.stop().unwrap();
    let report = expect_finished(&mut coordinator).await;
    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert!(harness.destination().exists());
}

/// Journal whose first few `record_seen` calls fail
struct FlakyJournal {
    failures_left: usize,
}

impl ProgressJournal for FlakyJournal {
    fn save_checkpoint(&mut self, _checkpoint: &Checkpoint) -> StorageResult<()> {
        Ok(())
    }

    fn record_seen(&mut self, _ids: &[PostId]) -> StorageResult<()> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(StorageError::Serialization("disk full".to_string()));
        }
        Ok(())
    }

    fn set_status(&mut self, _status: RunStatus) -> StorageResult<()> {
        Ok(())
    }

    fn finish(&mut self, _status: RunStatus) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_journal_failure_abandons_window_and_moves_on() {
    let harness = Harness::new();
    harness
        .api
        .push_page(&["30", "29"])
        .push_page(&["20"])
        .push_page(&[]);

    let journal = Box::new(FlakyJournal { failures_left: 1 });
    let mut coordinator =
        harness.coordinator_with_journal(params(2), journal, ResumePoint::default());
    coordinator.start(alice()).unwrap();
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.windows_abandoned, 1);
    assert_eq!(report.windows_completed, 1);
    assert_eq!(report.posts_collected, 3);
    assert_eq!(report.rows_written, 3);
    assert_eq!(
        report.final_checkpoint,
        Some(Checkpoint::AtBoundary { next_since: at(2) })
    );

    // the abandoned window is never paged again
    let queries = harness.api.queries();
    assert_eq!(queries.len(), 3);
    assert!(queries[1].contains("since:2024-02-06_01:00:00_UTC"));

    let errors = harness.observer.messages(Severity::Error);
    assert!(
        errors.iter().any(|m| m.contains("Abandoning window") && m.contains("disk full")),
        "errors: {:?}",
        errors
    );
}

#[tokio::test]
async fn test_rate_limit_exhaustion_asks_for_new_account() {
    let harness = Harness::new();
    harness.api.push_page(&["30", "29"]);
    for _ in 0..3 {
        harness
            .api
            .push_search(Err(ApiError::TooManyRequests("slow down".into())));
    }

    let mut coordinator = harness.coordinator(params(1), true);
    coordinator.start(alice()).unwrap();

    let checkpoint = match next_event(&mut coordinator).await {
        RunEvent::CredentialsNeeded { checkpoint, .. } => {
            checkpoint.expect("checkpoint should travel with the request")
        }
        other => panic!("expected CredentialsNeeded, got {:?}", other),
    };
    // first page plus the initial try and two retries
    assert_eq!(harness.api.search_calls(), 4);
    assert_eq!(coordinator.phase(), RunPhase::Paused);
    assert_eq!(
        checkpoint.progress().and_then(|p| p.cursor.clone()),
        Some(id("28"))
    );
    assert_eq!(coordinator.resume().unwrap(), ResumeOutcome::AwaitingAccount);

    harness.api.push_page(&["27"]);
    coordinator
        .switch_account(Some(Credentials::new("bob", "pw")))
        .unwrap();
    assert!(matches!(
        next_event(&mut coordinator).await,
        RunEvent::AccountSwitched { .. }
    ));
    let report = expect_finished(&mut coordinator).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.posts_collected, 3);
    assert_eq!(report.last_account, "bob");
    let queries = harness.api.queries();
    assert!(queries[4].ends_with("max_id:28"), "resumed query: {}", queries[4]);
}

#[tokio::test]
async fn test_switch_while_running_reports_paused() {
    let harness = Harness::new();
    for n in 0..10 {
        let id = (100 - n).to_string();
        harness.api.push_page(&[id.as_str()]);
    }
    let mut slow = params(1);
    slow.page_delay = Duration::from_millis(100);

    let mut coordinator = harness.coordinator(slow, true);
    coordinator.start(alice()).unwrap();
    wait_for_phase(&coordinator, RunPhase::Running).await;

    harness.api.set_login_delay(Duration::from_millis(500));
    coordinator
        .switch_account(Some(Credentials::new("bob", "pw")))
        .unwrap();

    wait_for_phase(&coordinator, RunPhase::Paused).await;
    assert!(coordinator.handle().is_paused());
    assert_eq!(coordinator.resume().unwrap(), ResumeOutcome::AwaitingAccount);

    match next_event(&mut coordinator).await {
        RunEvent::AccountSwitched { identifier } => assert_eq!(identifier, "bob"),
        other => panic!("expected AccountSwitched, got {:?}", other),
    }
    wait_for_phase(&coordinator, RunPhase::Running).await;
    assert!(!coordinator.handle().is_paused());

    let report = expect_finished(&mut coordinator).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.posts_collected, 10);
    assert_eq!(report.last_account, "bob");
}
