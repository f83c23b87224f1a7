// src/exec/mod.rs

//! Task runners.
//!
//! The executor talks to a [`Runner`] and never looks inside a task's
//! definition. Two implementations ship with the crate:
//! - [`ShellRunner`] runs the task source as a shell command.
//! - [`FnRunner`] calls a Rust closure; handy for embedding and tests.

pub mod runner;
pub mod shell;

pub use runner::{FnRunner, Runner, RunnerFuture};
pub use shell::ShellRunner;
