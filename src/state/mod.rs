//! State module for tracking run progress
//!
//! # Components
//!
//! - `RunPhase`: lifecycle phases of a run and their legal transitions
//! - `Checkpoint`: versioned resume point (window boundary or in-window page)
//! - `DedupLedger`: post identifiers already seen during the run
//! - `Post` / `PostId`: normalized search results

mod checkpoint;
mod ledger;
mod phase;
mod post;

// Re-export main types
pub use checkpoint::{Checkpoint, Window, WindowProgress, CHECKPOINT_VERSION};
pub use ledger::DedupLedger;
pub use phase::RunPhase;
pub use post::{Post, PostId, POST_TIMESTAMP_FORMAT};
