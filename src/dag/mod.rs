// src/dag/mod.rs

//! Task graph representation and validation.
//!
//! - [`task`] holds the task value object and its lifecycle state.
//! - [`graph`] is the arena of tasks that callers register against.
//! - [`render`] validates the graph (unique products, resolved upstreams,
//!   acyclicity) and produces a deterministic topological order.

pub mod graph;
pub mod render;
pub mod task;

pub use graph::Dag;
pub use render::{RenderError, RenderViolation, RenderedGraph};
pub use task::{AbortReason, Task, TaskId, TaskState};

/// Canonical task name type used throughout the crate.
pub type TaskName = String;
