// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod logging;
pub mod product;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::PipelineFile;
use crate::dag::Dag;
use crate::engine::{BuildOptions, Executor};
use crate::exec::ShellRunner;
use crate::fingerprint::{FileStore, FingerprintStore, MemoryStore};
use crate::product::ProductBackends;
use crate::types::StoreMode;

/// High-level entry point used by `main.rs`.
///
/// Loads the pipeline file, renders the DAG, then either prints the plan
/// (`--dry-run`) or builds it with a shell runner. Ctrl-C cancels the
/// build. Returns whether the build succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading pipeline file {}", config_path.display()))?;

    let root = config_root_dir(&config_path);
    debug!(root = %root.display(), "project root");

    let mut dag = Dag::from_config(&cfg, ProductBackends::new(&root))?;
    let store = open_store(&cfg, &root);

    let options = BuildOptions {
        concurrency: args
            .concurrency
            .unwrap_or_else(|| cfg.config.effective_concurrency()),
        force: args.force,
        on_store_error: cfg.config.on_store_error,
    };
    let executor = Executor::new(Arc::new(ShellRunner::new(&root)), store).with_options(options);

    if args.dry_run {
        let plan = executor.plan(&mut dag)?;
        print_plan(&plan);
        return Ok(true);
    }

    // Ctrl-C → stop dispatching, let running tasks finish.
    {
        let token = executor.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; cancelling build");
            token.cancel();
        });
    }

    let report = executor.build(&mut dag).await?;

    match executor.prune(&dag) {
        Ok(0) => {}
        Ok(n) => info!(removed = n, "pruned fingerprints of removed tasks"),
        Err(e) => warn!(error = %e, "failed to prune fingerprint store"),
    }

    println!("{report}");
    Ok(report.is_success())
}

fn open_store(cfg: &PipelineFile, root: &Path) -> Arc<dyn FingerprintStore> {
    match cfg.config.store {
        StoreMode::File => {
            let dir = root.join(&cfg.config.store_dir);
            debug!(dir = %dir.display(), "using file fingerprint store");
            Arc::new(FileStore::new(dir))
        }
        StoreMode::Memory => {
            debug!("using in-memory fingerprint store");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Directory the pipeline file lives in; products and the store are
/// resolved against it.
///
/// A bare file name like `Pipeline.toml` (parent = "") falls back to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn print_plan(plan: &[(String, fingerprint::Staleness)]) {
    println!("dagbuild dry-run");
    let width = plan.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, staleness) in plan {
        println!("  {name:<width$}  {staleness}");
    }
    let outdated = plan.iter().filter(|(_, s)| s.is_stale()).count();
    println!();
    println!("{outdated} of {} tasks would run", plan.len());
}
