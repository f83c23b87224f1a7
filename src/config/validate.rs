// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::{DagError, Result};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = DagError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(PipelineFile::new_unchecked(raw.config, raw.task))
    }
}

fn validate_raw_config(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagError::ConfigError(
            "pipeline must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.config.concurrency == Some(0) {
        return Err(DagError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.store_dir.trim().is_empty() {
        return Err(DagError::ConfigError(
            "[config].store_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawPipelineFile) -> Result<()> {
    let mut seen = HashSet::new();
    for task in cfg.task.iter() {
        if task.name.trim().is_empty() {
            return Err(DagError::ConfigError("task name must not be empty".to_string()));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(DagError::ConfigError(format!(
                "task '{}' is declared more than once",
                task.name
            )));
        }
        if task.cmd.trim().is_empty() {
            return Err(DagError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                task.name
            )));
        }
        if task.product.is_some() && task.products.is_some() {
            return Err(DagError::ConfigError(format!(
                "task '{}' sets both `product` and `products`; use one",
                task.name
            )));
        }

        let mut keys = HashSet::new();
        if let Some(key) = task.member_keys().into_iter().find(|k| !keys.insert(*k)) {
            return Err(DagError::ConfigError(format!(
                "task '{}' declares product key '{key}' more than once; set `key` on relations sharing a name",
                task.name
            )));
        }
    }
    Ok(())
}
