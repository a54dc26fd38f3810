//! Run status reporting
//!
//! Everything a run wants to tell its operator goes through [`RunObserver`]:
//! severity-tagged log lines plus three status cells (status text, active
//! account, rows in the output). The default observer forwards to `tracing`.

use std::fmt;

/// Severity of a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    /// A step finished successfully
    Ok,
    Warn,
    Error,
    /// The run cannot continue
    Critical,
    /// The operator needs to act
    UserInput,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::UserInput => "USER_INPUT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives run progress; called from the worker thread
pub trait RunObserver: Send + Sync {
    fn log(&self, message: &str, severity: Severity);

    fn update_status(&self, status: &str);

    fn update_active_account(&self, identifier: &str);

    fn update_output_count(&self, rows: u64);
}

/// Forwards observer calls to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn log(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Debug => tracing::debug!("{}", message),
            Severity::Info => tracing::info!("{}", message),
            Severity::Ok => tracing::info!(severity = "ok", "{}", message),
            Severity::Warn => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
            Severity::Critical => tracing::error!(severity = "critical", "{}", message),
            Severity::UserInput => tracing::warn!(severity = "user_input", "{}", message),
        }
    }

    fn update_status(&self, status: &str) {
        tracing::info!(status, "Status changed");
    }

    fn update_active_account(&self, identifier: &str) {
        tracing::info!(account = identifier, "Active account");
    }

    fn update_output_count(&self, rows: u64) {
        tracing::debug!(rows, "Output rows");
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::{ObservedEvent, RecordingObserver};

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use super::{RunObserver, Severity};
    use std::sync::Mutex;

    /// One call made on a [`RecordingObserver`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ObservedEvent {
        Log(Severity, String),
        Status(String),
        Account(String),
        Rows(u64),
    }

    /// Observer that keeps every call for later assertions
    #[derive(Debug, Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<ObservedEvent>>,
    }

    impl RecordingObserver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ObservedEvent> {
            self.lock().clone()
        }

        /// Log messages at `severity`
        pub fn messages(&self, severity: Severity) -> Vec<String> {
            self.lock()
                .iter()
                .filter_map(|event| match event {
                    ObservedEvent::Log(s, message) if *s == severity => Some(message.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn statuses(&self) -> Vec<String> {
            self.lock()
                .iter()
                .filter_map(|event| match event {
                    ObservedEvent::Status(status) => Some(status.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn last_account(&self) -> Option<String> {
            self.lock().iter().rev().find_map(|event| match event {
                ObservedEvent::Account(identifier) => Some(identifier.clone()),
                _ => None,
            })
        }

        pub fn last_row_count(&self) -> Option<u64> {
            self.lock().iter().rev().find_map(|event| match event {
                ObservedEvent::Rows(rows) => Some(*rows),
                _ => None,
            })
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ObservedEvent>> {
            self.events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn push(&self, event: ObservedEvent) {
            self.lock().push(event);
        }
    }

    impl RunObserver for RecordingObserver {
        fn log(&self, message: &str, severity: Severity) {
            self.push(ObservedEvent::Log(severity, message.to_string()));
        }

        fn update_status(&self, status: &str) {
            self.push(ObservedEvent::Status(status.to_string()));
        }

        fn update_active_account(&self, identifier: &str) {
            self.push(ObservedEvent::Account(identifier.to_string()));
        }

        fn update_output_count(&self, rows: u64) {
            self.push(ObservedEvent::Rows(rows));
        }
    }
}
