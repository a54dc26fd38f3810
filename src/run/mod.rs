//! Run orchestration
//!
//! - `control`: flags and cells shared by the control side and the worker
//! - `coordinator`: start / pause / resume / stop / switch-account surface
//! - `worker`: the thread hosting the scheduler and the command loop
//! - `report`: what a finished run hands back

mod control;
mod coordinator;
mod report;
mod worker;

pub use control::RunControl;
pub use coordinator::{ResumeOutcome, RunCoordinator, RunDependencies, RunEvent, RunHandle};
pub use report::{RunOutcome, RunReport};
