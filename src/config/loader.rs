// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::Result;

/// Load a pipeline file and return the raw, unvalidated model.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawPipelineFile = toml::from_str(&contents)?;
    debug!(path = ?path, tasks = config.task.len(), "parsed pipeline file");

    Ok(config)
}

/// Load a pipeline file and run file-level validation.
///
/// Graph checks (unknown upstreams, cycles, duplicate products) happen when
/// the resulting DAG is rendered.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw_config = load_from_path(&path)?;
    let config = PipelineFile::try_from(raw_config)?;
    Ok(config)
}
