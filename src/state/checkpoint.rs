//! Resumable run checkpoints
//!
//! A checkpoint is the minimal state needed to resume at the right window and
//! page. It is serialized as versioned JSON so the run journal can hold it
//! across restarts.

use crate::state::PostId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current on-disk checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// One half-open time window `[since, until)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
}

impl Window {
    pub fn new(since: NaiveDateTime, until: NaiveDateTime) -> Self {
        Self { since, until }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.since.format("%Y-%m-%d %H:%M"),
            self.until.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Progress inside one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowProgress {
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
    /// Upper bound for the next page; None before the first page lands
    pub cursor: Option<PostId>,
    /// Index of the next page to fetch
    pub page_index: u32,
    /// New posts collected in this window so far
    pub collected: u32,
}

impl WindowProgress {
    pub fn window(&self) -> Window {
        Window::new(self.since, self.until)
    }
}

/// Where a run stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Checkpoint {
    /// Between windows; the next window starts at `next_since`
    AtBoundary { next_since: NaiveDateTime },

    /// Part-way through a window
    InWindow(WindowProgress),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checkpoint: Checkpoint,
}

impl Checkpoint {
    /// Fresh progress for a window that has not fetched any page yet
    pub fn begin(window: Window) -> Self {
        Self::InWindow(WindowProgress {
            since: window.since,
            until: window.until,
            cursor: None,
            page_index: 0,
            collected: 0,
        })
    }

    /// Returns true if this is in-window progress for exactly `window`
    pub fn matches(&self, window: Window) -> bool {
        match self {
            Self::InWindow(progress) => progress.window() == window,
            Self::AtBoundary { .. } => false,
        }
    }

    /// Start of the earliest window that is not yet complete
    pub fn next_since(&self) -> NaiveDateTime {
        match self {
            Self::AtBoundary { next_since } => *next_since,
            Self::InWindow(progress) => progress.since,
        }
    }

    pub fn progress(&self) -> Option<&WindowProgress> {
        match self {
            Self::InWindow(progress) => Some(progress),
            Self::AtBoundary { .. } => None,
        }
    }

    /// Serializes to the versioned JSON form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Envelope {
            version: CHECKPOINT_VERSION,
            checkpoint: self.clone(),
        })
    }

    /// Parses the versioned JSON form
    ///
    /// # Returns
    ///
    /// * `Ok(Checkpoint)` - The stored checkpoint
    /// * `Err(String)` - Malformed JSON or an unsupported version
    pub fn from_json(json: &str) -> Result<Self, String> {
        let envelope: Envelope =
            serde_json::from_str(json).map_err(|e| format!("malformed checkpoint: {}", e))?;
        if envelope.version != CHECKPOINT_VERSION {
            return Err(format!(
                "unsupported checkpoint version {} (expected {})",
                envelope.version, CHECKPOINT_VERSION
            ));
        }
        Ok(envelope.checkpoint)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtBoundary { next_since } => {
                write!(f, "at boundary, next window {}", next_since.format("%Y-%m-%d %H:%M:%S"))
            }
            Self::InWindow(p) => {
                write!(
                    f,
                    "in window {}, page {}, {} collected",
                    p.window(),
                    p.page_index,
                    p.collected
                )?;
                if let Some(cursor) = &p.cursor {
                    write!(f, ", cursor {}", cursor)?;
                }
                Ok(())
            }
        }
    }
}
