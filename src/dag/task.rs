// src/dag/task.rs

//! Task value object and lifecycle state.

use std::collections::BTreeMap;
use std::fmt;

use crate::dag::TaskName;
use crate::product::{Product, Products};

/// Index of a task inside its [`Dag`](crate::dag::Dag).
///
/// Ids are assigned in declaration order and are only meaningful for the
/// DAG that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Why a task did not run even though it was stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A direct upstream task errored or was itself aborted.
    UpstreamFailed,
    /// The build was cancelled before the task was dispatched.
    Cancelled,
}

/// Lifecycle of a task.
///
/// `Registered` and `Rendered` are structural. Everything else is the
/// outcome of one build; every build starts again from `Rendered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Registered,
    Rendered,
    /// Up to date; nothing was executed.
    Skipped,
    /// Stale and handed to the runner (or about to be).
    WaitingExecution,
    Executed,
    Errored,
    Aborted(AbortReason),
}

impl TaskState {
    /// Whether this state ends the task's participation in a build.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Skipped | TaskState::Executed | TaskState::Errored | TaskState::Aborted(_)
        )
    }

    /// Whether downstream tasks must be aborted because of this state.
    pub fn blocks_downstream(self) -> bool {
        matches!(self, TaskState::Errored | TaskState::Aborted(_))
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Registered => "registered",
            TaskState::Rendered => "rendered",
            TaskState::Skipped => "skipped (up to date)",
            TaskState::WaitingExecution => "waiting execution",
            TaskState::Executed => "executed",
            TaskState::Errored => "errored",
            TaskState::Aborted(AbortReason::UpstreamFailed) => "aborted (upstream failed)",
            TaskState::Aborted(AbortReason::Cancelled) => "aborted (cancelled)",
        };
        f.write_str(s)
    }
}

/// A unit of work: an identity, the products it creates, the tasks it
/// depends on, and an opaque definition used for fingerprinting.
#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    /// Upstream task names, in declaration order, without duplicates.
    upstream: Vec<TaskName>,
    products: Products,
    /// Definition text (script, command line, source code...). Only ever
    /// hashed, never interpreted.
    source: String,
    params: BTreeMap<String, String>,
    state: TaskState,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: Vec::new(),
            products: Products::none(),
            source: source.into(),
            params: BTreeMap::new(),
            state: TaskState::Registered,
        }
    }

    pub fn with_products(mut self, products: impl Into<Products>) -> Self {
        self.products = products.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_upstream(mut self, name: impl Into<TaskName>) -> Self {
        self.add_upstream(name);
        self
    }

    /// Declare a dependency on another task.
    ///
    /// Returns `false` if the edge already existed; duplicate edges are
    /// never stored twice.
    pub fn add_upstream(&mut self, name: impl Into<TaskName>) -> bool {
        let name = name.into();
        if self.upstream.contains(&name) {
            return false;
        }
        self.upstream.push(name);
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstream(&self) -> &[TaskName] {
        &self.upstream
    }

    /// Flattened product handles (every member of a metaproduct).
    pub fn products(&self) -> impl Iterator<Item = &Product> + '_ {
        self.products.iter()
    }

    pub fn declared_products(&self) -> &Products {
        &self.products
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }
}
