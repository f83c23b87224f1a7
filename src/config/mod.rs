// src/config/mod.rs

//! Pipeline file model, loading and validation.
//!
//! - [`model`] holds the serde types for the TOML file.
//! - [`loader`] reads a file and runs [`validate`].
//! - [`validate`] checks file-level sanity; graph-level checks (cycles,
//!   unknown upstreams, duplicate products) belong to render.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, PipelineFile, RawPipelineFile, RelationConfig, TaskConfig};
