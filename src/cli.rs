// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagbuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagbuild",
    version,
    about = "Incrementally build a pipeline of tasks declared in a TOML file.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Pipeline.toml")]
    pub config: String,

    /// Rebuild every task, ignoring stored fingerprints.
    #[arg(long)]
    pub force: bool,

    /// Render the DAG and print which tasks would run, without executing.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[config].concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// Applies to dagbuild's own logs; dependencies stay at `warn`. If
    /// omitted, `DAGBUILD_LOG` filter directives are used, falling back to
    /// `warn,dagbuild=info`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
