// src/engine/mod.rs

//! Build orchestration.
//!
//! - [`scheduler`] is a synchronous, deterministic state machine: it owns
//!   the per-build task states and dependency counters and decides what is
//!   ready, skipped or aborted.
//! - [`executor`] is the async shell: it dispatches ready tasks to a
//!   [`Runner`](crate::exec::Runner), persists fingerprints, feeds
//!   completions back into the scheduler and handles cancellation.
//! - [`report`] is the result of a build.

use crate::dag::TaskId;

pub mod executor;
pub mod report;
pub mod scheduler;
pub mod scheduler_step;

pub use executor::{BuildOptions, Executor};
pub use report::{BuildReport, BuildStatus, TaskReport};
pub use scheduler::{BuildScheduler, ScheduledProduct, ScheduledTask};
pub use scheduler_step::SchedulerStep;

/// Outcome of a single runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}

/// Events flowing from task workers back into the executor loop.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    TaskFinished { id: TaskId, outcome: TaskOutcome },
}
