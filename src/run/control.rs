//! Shared run control
//!
//! [`RunControl`] is the one object both sides of a run touch: the
//! coordinator (control side) flips flags, the worker thread observes them.
//! Flags that the worker waits on are `watch` cells so waits wake on change
//! instead of polling, and every wait also wakes when a stop is requested.

use crate::state::{Checkpoint, RunPhase};
use crate::TrawlError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct RunControl {
    running: AtomicBool,
    awaiting_account: AtomicBool,
    paused: watch::Sender<bool>,
    stop: watch::Sender<bool>,
    session_ready: watch::Sender<bool>,
    phase: watch::Sender<RunPhase>,
    checkpoint: watch::Sender<Option<Checkpoint>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            awaiting_account: AtomicBool::new(false),
            paused: watch::Sender::new(false),
            stop: watch::Sender::new(false),
            session_ready: watch::Sender::new(false),
            phase: watch::Sender::new(RunPhase::Idle),
            checkpoint: watch::Sender::new(None),
        }
    }

    // ===== Flags =====

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// True while the run is paused because its session was lost
    pub fn is_awaiting_account(&self) -> bool {
        self.awaiting_account.load(Ordering::SeqCst)
    }

    pub fn set_awaiting_account(&self, awaiting: bool) {
        self.awaiting_account.store(awaiting, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Sets the pause flag; returns true if it changed
    pub fn set_paused(&self, paused: bool) -> bool {
        set_flag(&self.paused, paused)
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Requests a cooperative stop; wakes every wait
    pub fn request_stop(&self) {
        set_flag(&self.stop, true);
    }

    pub fn is_session_ready(&self) -> bool {
        *self.session_ready.borrow()
    }

    /// Sets session readiness; returns true if it changed
    pub fn set_session_ready(&self, ready: bool) -> bool {
        set_flag(&self.session_ready, ready)
    }

    // ===== Phase =====

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Moves to `to` if the transition is legal
    ///
    /// Transitioning to the current phase is a no-op.
    pub fn transition(&self, to: RunPhase) -> Result<(), TrawlError> {
        let mut result = Ok(());
        self.phase.send_if_modified(|current| {
            if *current == to {
                false
            } else if current.can_transition_to(to) {
                tracing::debug!(from = %current, to = %to, "Run phase");
                *current = to;
                true
            } else {
                result = Err(TrawlError::InvalidTransition { from: *current, to });
                false
            }
        });
        result
    }

    // ===== Checkpoint snapshot =====

    /// Latest checkpoint published by the worker
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint.borrow().clone()
    }

    pub fn publish_checkpoint(&self, checkpoint: Checkpoint) {
        self.checkpoint.send_replace(Some(checkpoint));
    }

    // ===== Waits =====

    /// Waits while paused
    ///
    /// Returns false if a stop was requested instead.
    pub async fn wait_until_unpaused(&self) -> bool {
        self.wait_for_flag(&self.paused, false).await
    }

    /// Waits until a session is ready
    ///
    /// Returns false if a stop was requested instead.
    pub async fn wait_for_session(&self) -> bool {
        self.wait_for_flag(&self.session_ready, true).await
    }

    /// Sleeps for `duration`
    ///
    /// Returns false if a stop was requested before the time was up.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut stop = self.stop.subscribe();
        if *stop.borrow_and_update() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = stop.changed() => false,
        }
    }

    async fn wait_for_flag(&self, flag: &watch::Sender<bool>, wanted: bool) -> bool {
        let mut value = flag.subscribe();
        let mut stop = self.stop.subscribe();
        loop {
            if *stop.borrow_and_update() {
                return false;
            }
            if *value.borrow_and_update() == wanted {
                return true;
            }
            tokio::select! {
                changed = value.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = stop.changed() => {}
            }
        }
    }
}

fn set_flag(flag: &watch::Sender<bool>, value: bool) -> bool {
    flag.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_flags_report_changes() {
        let control = RunControl::new();
        assert!(control.set_paused(true));
        assert!(!control.set_paused(true));
        assert!(control.is_paused());
        assert!(control.set_session_ready(true));
        assert!(control.is_session_ready());
    }

    #[test]
    fn test_transition_validation() {
        let control = RunControl::new();
        assert!(matches!(
            control.transition(RunPhase::Running),
            Err(TrawlError::InvalidTransition { .. })
        ));
        control.transition(RunPhase::Initializing).unwrap();
        control.transition(RunPhase::Running).unwrap();
        control.transition(RunPhase::Running).unwrap();
        assert_eq!(control.phase(), RunPhase::Running);
    }

    #[test]
    fn test_checkpoint_snapshot() {
        let control = RunControl::new();
        assert!(control.checkpoint().is_none());
        let next = chrono::NaiveDate::from_ymd_opt(2024, 2, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        control.publish_checkpoint(Checkpoint::AtBoundary { next_since: next });
        assert!(control.checkpoint().is_some());
    }

    #[tokio::test]
    async fn test_unpause_wakes_waiter() {
        let control = Arc::new(RunControl::new());
        control.set_paused(true);

        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_until_unpaused().await })
        };
        tokio::task::yield_now().await;
        control.set_paused(false);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_wakes_session_wait() {
        let control = Arc::new(RunControl::new());
        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_for_session().await })
        };
        tokio::task::yield_now().await;
        control.request_stop();

        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let control = Arc::new(RunControl::new());
        let sleeper = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.sleep(Duration::from_secs(3600)).await })
        };
        tokio::task::yield_now().await;
        control.request_stop();

        let finished = tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("sleep should wake on stop")
            .unwrap();
        assert!(!finished);
    }

    #[tokio::test]
    async fn test_zero_sleep_completes() {
        let control = RunControl::new();
        assert!(control.sleep(Duration::ZERO).await);
        control.request_stop();
        assert!(!control.sleep(Duration::ZERO).await);
    }
}
