// src/engine/executor.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::{Dag, TaskId, TaskName};
use crate::engine::report::{BuildReport, TaskReport};
use crate::engine::scheduler::{BuildScheduler, ScheduledTask};
use crate::engine::scheduler_step::SchedulerStep;
use crate::engine::{BuildEvent, TaskOutcome};
use crate::errors::{DagError, Result, StoreError};
use crate::exec::Runner;
use crate::fingerprint::{FingerprintStore, ResolveOptions, Staleness, resolve};
use crate::types::StoreErrorPolicy;

/// Knobs for a build.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Maximum number of tasks handed to the runner at once (at least 1).
    pub concurrency: usize,
    /// Ignore stored fingerprints and run every task.
    pub force: bool,
    pub on_store_error: StoreErrorPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            force: false,
            on_store_error: StoreErrorPolicy::default(),
        }
    }
}

impl BuildOptions {
    fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            force: self.force,
            on_store_error: self.on_store_error,
        }
    }
}

/// Runs builds of a [`Dag`]: render, classify, then dispatch stale tasks to
/// the runner in dependency order with bounded concurrency.
///
/// All scheduling decisions are made by a [`BuildScheduler`] on the task
/// that called [`Executor::build`]; workers only run the runner and send a
/// [`BuildEvent`] back. A task's fingerprint is persisted before its
/// downstream tasks are released.
pub struct Executor {
    runner: Arc<dyn Runner>,
    store: Arc<dyn FingerprintStore>,
    options: BuildOptions,
    cancel: CancellationToken,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("store", &self.store)
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(runner: Arc<dyn Runner>, store: Arc<dyn FingerprintStore>) -> Self {
        Self {
            runner,
            store,
            options: BuildOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = BuildOptions {
            concurrency: options.concurrency.max(1),
            ..options
        };
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Token that cancels builds of this executor.
    ///
    /// Cancelling stops dispatching: in-flight tasks finish, everything not
    /// yet dispatched ends `Aborted(Cancelled)`. The token stays cancelled,
    /// so later builds abort every stale task immediately.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Render and classify without executing anything. Tasks are listed in
    /// topological order.
    pub fn plan(&self, dag: &mut Dag) -> Result<Vec<(TaskName, Staleness)>> {
        let graph = dag.render()?.clone();
        let resolution = resolve(dag, &graph, self.store.as_ref(), self.options.resolve_options())?;

        Ok(graph
            .order()
            .iter()
            .map(|&id| (dag.task(id).name().to_string(), resolution.staleness(id).clone()))
            .collect())
    }

    /// Drop stored fingerprints of tasks that are no longer part of `dag`.
    pub fn prune(&self, dag: &Dag) -> Result<usize> {
        let active: Vec<&str> = dag.tasks().map(|t| t.name()).collect();
        Ok(self.store.prune(&active)?)
    }

    /// Build `dag`.
    ///
    /// Render errors and store errors are returned as `Err`; task failures
    /// are not, they are part of the returned [`BuildReport`].
    pub async fn build(&self, dag: &mut Dag) -> Result<BuildReport> {
        let graph = dag.render()?.clone();
        dag.reset_states();

        let resolution = resolve(dag, &graph, self.store.as_ref(), self.options.resolve_options())?;
        info!(
            tasks = dag.len(),
            outdated = resolution.stale_count(),
            concurrency = self.options.concurrency,
            "starting build"
        );

        let mut scheduler = BuildScheduler::from_resolution(&graph, &resolution);
        let mut errors: HashMap<TaskId, String> = HashMap::new();
        let mut fatal: Option<StoreError> = None;
        let (tx, mut rx) = mpsc::channel::<BuildEvent>(self.options.concurrency);

        let step = scheduler.start();
        log_step(dag, &scheduler, &step);

        loop {
            if self.cancel.is_cancelled() && !scheduler.is_cancelled() {
                let step = scheduler.cancel();
                log_step(dag, &scheduler, &step);
            }

            while scheduler.running() < self.options.concurrency {
                let Some(id) = scheduler.pop_ready() else {
                    break;
                };
                self.dispatch(ScheduledTask::from_task(id, dag.task(id), dag.backends()), tx.clone());
            }

            if scheduler.running() == 0 {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled(), if !scheduler.is_cancelled() => {
                    let step = scheduler.cancel();
                    log_step(dag, &scheduler, &step);
                }
                Some(BuildEvent::TaskFinished { id, outcome }) = rx.recv() => {
                    let name = dag.task(id).name();
                    let success = match outcome {
                        TaskOutcome::Success => match self.store.put(&resolution.record_for(id)) {
                            Ok(()) => {
                                info!(task = %name, "task executed");
                                true
                            }
                            Err(err) => {
                                error!(task = %name, error = %err, "failed to persist fingerprint; stopping build");
                                errors.insert(id, format!("persisting fingerprint: {err}"));
                                if fatal.is_none() {
                                    fatal = Some(err);
                                }
                                false
                            }
                        },
                        TaskOutcome::Failed(reason) => {
                            warn!(task = %name, %reason, "task failed; aborting its downstream tasks");
                            errors.insert(id, reason);
                            false
                        }
                    };

                    let step = scheduler.complete(id, success);
                    log_step(dag, &scheduler, &step);

                    if fatal.is_some() && !scheduler.is_cancelled() {
                        let step = scheduler.cancel();
                        log_step(dag, &scheduler, &step);
                    }
                }
                else => {
                    warn!("completion channel closed with tasks in flight");
                    break;
                }
            }
        }

        if !scheduler.is_finished() {
            warn!("build loop ended with non-terminal tasks");
        }

        for (i, state) in scheduler.states().iter().enumerate() {
            dag.set_state(TaskId(i), *state);
        }

        if let Some(err) = fatal {
            return Err(DagError::Store(err));
        }

        let report = BuildReport::new(
            dag.tasks()
                .enumerate()
                .map(|(i, task)| TaskReport {
                    name: task.name().to_string(),
                    state: task.state(),
                    staleness: resolution.staleness(TaskId(i)).clone(),
                    error: errors.remove(&TaskId(i)),
                })
                .collect(),
        );
        info!(status = ?report.status(), "build finished");
        Ok(report)
    }

    /// Run one task on its own tokio task and report back over `tx`.
    fn dispatch(&self, task: ScheduledTask, tx: mpsc::Sender<BuildEvent>) {
        let runner = Arc::clone(&self.runner);
        debug!(task = %task.name, "dispatching task");

        tokio::spawn(async move {
            let id = task.id;
            let name = task.name.clone();

            // Run on a nested task so a panicking runner still produces a
            // completion event.
            let handle = tokio::spawn(async move { runner.execute(&task).await });
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => TaskOutcome::Failed(format!("runner panicked: {err}")),
            };

            if tx.send(BuildEvent::TaskFinished { id, outcome }).await.is_err() {
                debug!(task = %name, "build loop gone; dropping completion");
            }
        });
    }
}

fn log_step(dag: &Dag, scheduler: &BuildScheduler, step: &SchedulerStep) {
    for &id in &step.newly_skipped {
        info!(task = %dag.task(id).name(), "up to date; skipping");
    }
    for &id in &step.newly_aborted {
        warn!(task = %dag.task(id).name(), state = %scheduler.state_of(id), "task not run");
    }
    for &id in &step.newly_ready {
        debug!(task = %dag.task(id).name(), "ready");
    }
}
