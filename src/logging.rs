// src/logging.rs

//! Logging setup for `dagbuild` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. `--log-level`, applied to this crate (dependencies stay at `warn`)
//! 2. `DAGBUILD_LOG`, taken as full `EnvFilter` directives
//!    (e.g. `dagbuild::engine=debug,info`)
//! 3. `dagbuild=info`
//!
//! Logs go to STDERR; the build summary is printed on stdout.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "DAGBUILD_LOG";

/// Filter used when neither `--log-level` nor `DAGBUILD_LOG` is given.
pub const DEFAULT_DIRECTIVES: &str = "warn,dagbuild=info";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("initialising tracing subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(format!("warn,dagbuild={}", level.as_str())));
    }

    match env.map(str::trim) {
        Some(directives) if !directives.is_empty() => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {LOG_ENV} value: {directives:?}")),
        _ => Ok(EnvFilter::new(DEFAULT_DIRECTIVES)),
    }
}
