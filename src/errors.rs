// src/errors.rs

//! Crate-wide error types and aliases.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::dag::render::{RenderError, RenderViolation};

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of the fingerprint store.
///
/// These are fatal to a build: staleness can neither be assumed nor ruled
/// out when the store cannot be read or written.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("fingerprint store IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt fingerprint record at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to serialize fingerprint record for task '{task}': {reason}")]
    Serialize { task: String, reason: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
