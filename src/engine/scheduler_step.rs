// src/engine/scheduler_step.rs

//! Step-by-step result type for the build scheduler.

use crate::dag::TaskId;

/// What changed as the result of one scheduler step.
///
/// Useful for tests that drive the scheduler by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Stale tasks whose upstreams are all terminal; queued for dispatch.
    pub newly_ready: Vec<TaskId>,
    /// Up-to-date tasks that were skipped.
    pub newly_skipped: Vec<TaskId>,
    /// Tasks aborted in this step (upstream failure or cancellation).
    pub newly_aborted: Vec<TaskId>,
    /// Whether every task is now terminal.
    pub build_finished: bool,
}
