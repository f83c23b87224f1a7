// src/dag/graph.rs

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::config::model::PipelineFile;
use crate::dag::render::{self, RenderError, RenderedGraph};
use crate::dag::task::{Task, TaskId, TaskState};
use crate::dag::TaskName;
use crate::errors::{DagError, Result};
use crate::product::ProductBackends;

/// Arena of tasks keyed by declaration index, plus a name index.
///
/// Tasks are registered incrementally and the graph is validated once with
/// [`Dag::render`]. The render result is cached; any mutation drops it and
/// returns every task to `Registered`.
#[derive(Debug)]
pub struct Dag {
    tasks: Vec<Task>,
    index: HashMap<TaskName, TaskId>,
    backends: ProductBackends,
    rendered: Option<RenderedGraph>,
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

impl Dag {
    /// Empty DAG rooted at the current directory with no relation clients.
    pub fn new() -> Self {
        Self::with_backends(ProductBackends::default())
    }

    pub fn with_backends(backends: ProductBackends) -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            backends,
            rendered: None,
        }
    }

    /// Build a DAG from a validated [`PipelineFile`].
    ///
    /// Relative file products are resolved against `root` (usually the
    /// directory holding the pipeline file). Upstream references are not
    /// checked here; [`Dag::render`] reports unknown ones.
    pub fn from_config(cfg: &PipelineFile, backends: ProductBackends) -> Result<Self> {
        let mut dag = Self::with_backends(backends);
        for tc in cfg.task.iter() {
            dag.add_task(tc.to_task())?;
        }
        Ok(dag)
    }

    /// Register a task. Names must be unique within the DAG.
    pub fn add_task(&mut self, mut task: Task) -> Result<TaskId> {
        if self.index.contains_key(task.name()) {
            return Err(DagError::DuplicateTask(task.name().to_string()));
        }

        let id = TaskId(self.tasks.len());
        task.set_state(TaskState::Registered);
        debug!(task = %task.name(), id = id.index(), "registered task");

        self.index.insert(task.name().to_string(), id);
        self.tasks.push(task);
        self.invalidate();
        Ok(id)
    }

    /// Add an edge `upstream -> task` between two registered tasks.
    ///
    /// Adding an existing edge is a no-op.
    pub fn add_upstream(&mut self, task: &str, upstream: &str) -> Result<()> {
        if !self.index.contains_key(upstream) {
            return Err(DagError::TaskNotFound(upstream.to_string()));
        }
        let id = self
            .id_of(task)
            .ok_or_else(|| DagError::TaskNotFound(task.to_string()))?;

        if self.tasks[id.0].add_upstream(upstream) {
            self.invalidate();
        }
        Ok(())
    }

    pub fn id_of(&self, name: &str) -> Option<TaskId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.id_of(name).map(|id| &self.tasks[id.0])
    }

    /// Task by id.
    ///
    /// # Panics
    /// If `id` was issued by another DAG with more tasks.
    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn backends(&self) -> &ProductBackends {
        &self.backends
    }

    pub fn root(&self) -> &Path {
        self.backends.root()
    }

    /// Validate the graph and compute its topological order.
    ///
    /// Cached until the next mutation, so calling it repeatedly is cheap and
    /// always yields the same order.
    pub fn render(&mut self) -> std::result::Result<&RenderedGraph, RenderError> {
        let graph = match self.rendered.take() {
            Some(graph) => graph,
            None => {
                let graph = render::render(&self.tasks, &self.index, &self.backends)?;
                for task in self.tasks.iter_mut() {
                    task.set_state(TaskState::Rendered);
                }
                graph
            }
        };
        Ok(self.rendered.insert(graph))
    }

    /// Last successful render, if the DAG has not changed since.
    pub fn rendered(&self) -> Option<&RenderedGraph> {
        self.rendered.as_ref()
    }

    /// Put every task back to `Rendered` ahead of a new build.
    pub(crate) fn reset_states(&mut self) {
        for task in self.tasks.iter_mut() {
            task.set_state(TaskState::Rendered);
        }
    }

    pub(crate) fn set_state(&mut self, id: TaskId, state: TaskState) {
        self.tasks[id.0].set_state(state);
    }

    fn invalidate(&mut self) {
        if self.rendered.take().is_some() {
            debug!("DAG mutated; dropping cached render");
        }
        for task in self.tasks.iter_mut() {
            task.set_state(TaskState::Registered);
        }
    }
}
