// src/exec/runner.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::engine::{ScheduledTask, TaskOutcome};

pub type RunnerFuture<'a> = Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'a>>;

/// Executes the body of one task.
///
/// Runners are opaque to the build: they may be slow, stateful, or hand
/// off to an interpreter. Failures are reported through
/// [`TaskOutcome::Failed`], never by panicking (a panic is still caught
/// and recorded as a failure).
pub trait Runner: Send + Sync {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> RunnerFuture<'a>;
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> RunnerFuture<'a> {
        (**self).execute(task)
    }
}

type TaskFn = dyn Fn(&ScheduledTask) -> anyhow::Result<()> + Send + Sync;

/// Runs a blocking closure on tokio's blocking pool.
#[derive(Clone)]
pub struct FnRunner {
    f: Arc<TaskFn>,
}

impl fmt::Debug for FnRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRunner").finish_non_exhaustive()
    }
}

impl FnRunner {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ScheduledTask) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl Runner for FnRunner {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> RunnerFuture<'a> {
        let f = Arc::clone(&self.f);
        let task = task.clone();

        Box::pin(async move {
            let name = task.name.clone();
            match tokio::task::spawn_blocking(move || f(&task)).await {
                Ok(Ok(())) => TaskOutcome::Success,
                Ok(Err(err)) => {
                    debug!(task = %name, error = %err, "task function failed");
                    TaskOutcome::Failed(format!("{err:#}"))
                }
                Err(join) => TaskOutcome::Failed(format!("task function panicked: {join}")),
            }
        })
    }
}
