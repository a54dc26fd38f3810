//! Scraping core
//!
//! Leaf first:
//! - `classify`: error kinds and the pure retry policy
//! - `query`: search expression for one page
//! - `fetcher`: one page with in-place retries
//! - `paginator`: all pages of one window
//! - `scheduler`: all windows of the range

mod classify;
mod fetcher;
mod paginator;
mod query;
mod scheduler;

pub use classify::{
    classify, decide, login_backoff, Backoff, ClassifiedError, ErrorKind, RetryDecision,
};
pub use fetcher::{PageFetcher, PageOutcome};
pub use paginator::{next_cursor, WindowEnd, WindowOutcome, WindowPaginator};
pub use query::build_query;
pub use scheduler::{plan_windows, IntervalScheduler, ScheduleState, ScheduleSummary};
