// src/engine/report.rs

use std::fmt;

use crate::dag::{AbortReason, TaskName, TaskState};
use crate::fingerprint::Staleness;

/// Overall result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// Every task executed or was skipped.
    Success,
    /// At least one task errored.
    Failed,
    /// Nothing errored, but the build was cancelled before every task ran.
    Cancelled,
}

/// Outcome of one task in one build.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: TaskName,
    pub state: TaskState,
    /// Classification computed before the build started.
    pub staleness: Staleness,
    /// Runner failure reason for `Errored` tasks.
    pub error: Option<String>,
}

/// Per-task outcomes of a build, in declaration order.
#[derive(Debug, Clone)]
pub struct BuildReport {
    tasks: Vec<TaskReport>,
}

impl BuildReport {
    pub(crate) fn new(tasks: Vec<TaskReport>) -> Self {
        Self { tasks }
    }

    pub fn status(&self) -> BuildStatus {
        if self.tasks.iter().any(|t| t.state == TaskState::Errored) {
            BuildStatus::Failed
        } else if self
            .tasks
            .iter()
            .any(|t| t.state == TaskState::Aborted(AbortReason::Cancelled))
        {
            BuildStatus::Cancelled
        } else {
            BuildStatus::Success
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == BuildStatus::Success
    }

    pub fn tasks(&self) -> &[TaskReport] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.task(name).map(|t| t.state)
    }

    /// Names of tasks in the given state, in declaration order.
    pub fn names_in(&self, state: TaskState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.name.as_str())
            .collect()
    }

    pub fn executed(&self) -> Vec<&str> {
        self.names_in(TaskState::Executed)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_in(TaskState::Skipped)
    }

    pub fn errored(&self) -> Vec<&str> {
        self.names_in(TaskState::Errored)
    }

    pub fn aborted(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.state, TaskState::Aborted(_)))
            .map(|t| t.name.as_str())
            .collect()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.tasks.iter().map(|t| t.name.len()).max().unwrap_or(0);
        for t in &self.tasks {
            write!(f, "{:<width$}  {}", t.name, t.state)?;
            if let Some(err) = &t.error {
                write!(f, ": {err}")?;
            }
            writeln!(f)?;
        }
        write!(f, "build {:?}", self.status())
    }
}
