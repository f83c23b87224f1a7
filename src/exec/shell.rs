// src/exec/shell.rs

//! Shell command runner.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::engine::{ScheduledTask, TaskOutcome};
use crate::exec::runner::{Runner, RunnerFuture};

/// Runs a task's source through `sh -c` (or `cmd /C` on Windows).
///
/// The command text is passed to the shell verbatim; nothing is templated.
/// Products, parameters and upstream names are exported as environment
/// variables instead:
///
/// - `DAGBUILD_TASK`: task name
/// - `DAGBUILD_PRODUCT`: path of a single file product
/// - `DAGBUILD_PRODUCT_<KEY>`: path of metaproduct member `<key>`
/// - `DAGBUILD_PARAM_<KEY>`: parameter `<key>`
/// - `DAGBUILD_UPSTREAM`: comma-separated upstream task names
///
/// Keys are upper-cased, with anything outside `[A-Z0-9_]` replaced by `_`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    workdir: PathBuf,
}

impl ShellRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn command(&self, task: &ScheduledTask) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&task.source);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&task.source);
            c
        };

        cmd.current_dir(&self.workdir)
            .env("DAGBUILD_TASK", &task.name)
            .env("DAGBUILD_UPSTREAM", task.upstream.join(","));

        if let Some(path) = task.product_path() {
            cmd.env("DAGBUILD_PRODUCT", path);
        }
        for product in &task.products {
            if let (Some(key), Some(path)) = (&product.key, &product.path) {
                cmd.env(format!("DAGBUILD_PRODUCT_{}", env_key(key)), path);
            }
        }
        for (key, value) in &task.params {
            cmd.env(format!("DAGBUILD_PARAM_{}", env_key(key)), value);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, task: &ScheduledTask) -> Result<TaskOutcome> {
        info!(task = %task.name, cmd = %task.source, "starting task process");

        let mut child = self
            .command(task)
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", task.name))?;

        if let Some(stdout) = child.stdout.take() {
            let task_name = task.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stdout: {}", line);
                }
            });
        }

        // Keep the last stderr line as the failure reason.
        let stderr_tail = child.stderr.take().map(|stderr| {
            let task_name = task.name.clone();
            tokio::spawn(async move {
                let mut last = None;
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_name, "stderr: {}", line);
                    if !line.trim().is_empty() {
                        last = Some(line);
                    }
                }
                last
            })
        });

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of task '{}'", task.name))?;

        let code = status.code().unwrap_or(-1);
        info!(
            task = %task.name,
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if status.success() {
            return Ok(TaskOutcome::Success);
        }

        let tail = match stderr_tail {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };
        let reason = match tail {
            Some(line) => format!("exit code {code}: {line}"),
            None => format!("exit code {code}"),
        };
        Ok(TaskOutcome::Failed(reason))
    }
}

impl Runner for ShellRunner {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> RunnerFuture<'a> {
        Box::pin(async move {
            match self.run(task).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(task = %task.name, error = %err, "task execution error");
                    TaskOutcome::Failed(format!("{err:#}"))
                }
            }
        })
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
