// src/fingerprint/mod.rs

//! Fingerprints and staleness.
//!
//! - [`hash`] computes blake3 fingerprints of task definitions and of their
//!   ancestry.
//! - [`store`] persists the fingerprint of every successful execution.
//! - [`resolver`] compares computed fingerprints against the store and
//!   classifies every task as stale or up to date.

pub mod hash;
pub mod resolver;
pub mod store;

pub use resolver::{Resolution, ResolveOptions, StaleReason, Staleness, resolve};
pub use store::{FileStore, FingerprintRecord, FingerprintStore, MemoryStore, RecordOutcome};
