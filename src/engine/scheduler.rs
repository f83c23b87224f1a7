// src/engine/scheduler.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dag::{AbortReason, RenderedGraph, Task, TaskId, TaskName, TaskState};
use crate::engine::scheduler_step::SchedulerStep;
use crate::fingerprint::Resolution;
use crate::product::{Product, ProductBackends, Products};

/// Per-build scheduling state for a rendered, classified graph.
///
/// Readiness is tracked with dependency counters: every task starts with
/// the number of its direct upstreams, and each upstream reaching a terminal
/// state decrements it. At zero the task is settled immediately:
/// - up to date: `Skipped`
/// - an upstream errored or was aborted: `Aborted(UpstreamFailed)`
/// - otherwise: queued for dispatch
///
/// Skips and aborts are terminal, so they cascade through the downstream
/// closure within the same step. The dispatch queue hands out the smallest
/// declaration index first.
///
/// This type does no IO and is driven entirely by the caller.
#[derive(Debug)]
pub struct BuildScheduler {
    graph: RenderedGraph,
    stale: Vec<bool>,
    states: Vec<TaskState>,
    remaining: Vec<usize>,
    ready: BinaryHeap<Reverse<TaskId>>,
    running: usize,
    cancelled: bool,
}

impl BuildScheduler {
    /// `stale[i]` tells whether the task with declaration index `i` has to
    /// run.
    pub fn new(graph: &RenderedGraph, stale: Vec<bool>) -> Self {
        let n = graph.len();
        let remaining = (0..n).map(|i| graph.upstream_of(TaskId(i)).len()).collect();

        Self {
            graph: graph.clone(),
            stale,
            states: vec![TaskState::Rendered; n],
            remaining,
            ready: BinaryHeap::new(),
            running: 0,
            cancelled: false,
        }
    }

    pub fn from_resolution(graph: &RenderedGraph, resolution: &Resolution) -> Self {
        let stale = (0..graph.len()).map(|i| resolution.is_stale(TaskId(i))).collect();
        Self::new(graph, stale)
    }

    /// Settle every root task. Call once before dispatching.
    pub fn start(&mut self) -> SchedulerStep {
        let roots: Vec<TaskId> = self
            .graph
            .order()
            .iter()
            .copied()
            .filter(|id| self.remaining[id.0] == 0)
            .collect();
        debug!(roots = roots.len(), "scheduler: starting build");
        self.settle(roots)
    }

    /// Take the next task to hand to the runner, marking it
    /// `WaitingExecution`. Returns `None` once cancelled.
    pub fn pop_ready(&mut self) -> Option<TaskId> {
        if self.cancelled {
            return None;
        }
        let Reverse(id) = self.ready.pop()?;
        self.states[id.0] = TaskState::WaitingExecution;
        self.running += 1;
        Some(id)
    }

    /// Record the outcome of a dispatched task and settle whatever it
    /// unblocks.
    pub fn complete(&mut self, id: TaskId, success: bool) -> SchedulerStep {
        if self.states[id.0] != TaskState::WaitingExecution {
            warn!(
                id = id.0,
                state = %self.states[id.0],
                "completion for a task that was not dispatched; ignoring"
            );
            return SchedulerStep {
                build_finished: self.is_finished(),
                ..SchedulerStep::default()
            };
        }

        self.running -= 1;
        self.states[id.0] = if success {
            TaskState::Executed
        } else {
            TaskState::Errored
        };

        let unlocked = self.unlock_downstream(id);
        self.settle(unlocked)
    }

    /// Stop dispatching. Every task that has not been dispatched yet is
    /// aborted; dispatched tasks may still complete.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.cancelled {
            step.build_finished = self.is_finished();
            return step;
        }

        self.cancelled = true;
        self.ready.clear();
        for &id in self.graph.order() {
            let state = self.states[id.0];
            if !state.is_terminal() && state != TaskState::WaitingExecution {
                self.states[id.0] = TaskState::Aborted(AbortReason::Cancelled);
                step.newly_aborted.push(id);
            }
        }

        info!(
            aborted = step.newly_aborted.len(),
            in_flight = self.running,
            "scheduler: build cancelled"
        );
        step.build_finished = self.is_finished();
        step
    }

    pub fn is_finished(&self) -> bool {
        self.states.iter().all(|s| s.is_terminal())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of dispatched tasks that have not completed.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn has_ready(&self) -> bool {
        !self.cancelled && !self.ready.is_empty()
    }

    pub fn state_of(&self, id: TaskId) -> TaskState {
        self.states[id.0]
    }

    pub fn states(&self) -> &[TaskState] {
        &self.states
    }

    fn unlock_downstream(&mut self, id: TaskId) -> Vec<TaskId> {
        let mut unlocked = Vec::new();
        for &d in self.graph.downstream_of(id) {
            self.remaining[d.0] -= 1;
            if self.remaining[d.0] == 0 {
                unlocked.push(d);
            }
        }
        unlocked
    }

    fn upstream_blocked(&self, id: TaskId) -> bool {
        self.graph
            .upstream_of(id)
            .iter()
            .any(|up| self.states[up.0].blocks_downstream())
    }

    fn settle(&mut self, candidates: Vec<TaskId>) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let mut queue: VecDeque<TaskId> = candidates.into();

        while let Some(id) = queue.pop_front() {
            if self.states[id.0].is_terminal() {
                // Aborted by cancellation before its upstreams finished.
                continue;
            }

            if !self.stale[id.0] {
                self.states[id.0] = TaskState::Skipped;
                step.newly_skipped.push(id);
                queue.extend(self.unlock_downstream(id));
            } else if self.upstream_blocked(id) {
                self.states[id.0] = TaskState::Aborted(AbortReason::UpstreamFailed);
                step.newly_aborted.push(id);
                queue.extend(self.unlock_downstream(id));
            } else if self.cancelled {
                self.states[id.0] = TaskState::Aborted(AbortReason::Cancelled);
                step.newly_aborted.push(id);
                queue.extend(self.unlock_downstream(id));
            } else {
                self.ready.push(Reverse(id));
                step.newly_ready.push(id);
            }
        }

        step.build_finished = self.is_finished();
        step
    }
}

/// A product as handed to the runner.
#[derive(Debug, Clone)]
pub struct ScheduledProduct {
    /// Metaproduct key, `None` for a single product.
    pub key: Option<String>,
    pub product: Product,
    /// Absolute location for file products.
    pub path: Option<PathBuf>,
}

/// Description of a task the executor hands to the runner.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: TaskName,
    pub source: String,
    pub params: BTreeMap<String, String>,
    pub products: Vec<ScheduledProduct>,
    pub upstream: Vec<TaskName>,
}

impl ScheduledTask {
    pub fn from_task(id: TaskId, task: &Task, backends: &ProductBackends) -> Self {
        let resolve = |key: Option<&String>, product: &Product| ScheduledProduct {
            key: key.cloned(),
            product: product.clone(),
            path: match product {
                Product::File(p) => Some(backends.resolve_path(p)),
                Product::Relation(_) => None,
            },
        };

        let products = match task.declared_products() {
            Products::Single(p) => vec![resolve(None, p)],
            Products::Meta(members) => members.iter().map(|(k, p)| resolve(Some(k), p)).collect(),
        };

        Self {
            id,
            name: task.name().to_string(),
            source: task.source().to_string(),
            params: task.params().clone(),
            products,
            upstream: task.upstream().to_vec(),
        }
    }

    /// Location of a single file product.
    pub fn product_path(&self) -> Option<&Path> {
        match self.products.as_slice() {
            [only] if only.key.is_none() => only.path.as_deref(),
            _ => None,
        }
    }

    /// Metaproduct member by key.
    pub fn product(&self, key: &str) -> Option<&ScheduledProduct> {
        self.products.iter().find(|p| p.key.as_deref() == Some(key))
    }
}
