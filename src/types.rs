use std::str::FromStr;

use serde::Deserialize;

/// Where fingerprint records are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// One record file per task under `<root>/.dagbuild/fingerprints`.
    #[default]
    File,
    /// Records live in memory only (lost on restart).
    Memory,
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreMode::File),
            "memory" => Ok(StoreMode::Memory),
            other => Err(format!(
                "invalid store: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}

/// What the staleness resolver does when a fingerprint record cannot be read.
///
/// - `Fail` (default): the build stops with a store error.
/// - `AssumeStale`: the task is treated as stale and rebuilt. This has to be
///   opted into explicitly since it may re-run expensive tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorPolicy {
    #[default]
    Fail,
    AssumeStale,
}

impl FromStr for StoreErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(StoreErrorPolicy::Fail),
            "assume_stale" | "assume-stale" => Ok(StoreErrorPolicy::AssumeStale),
            other => Err(format!(
                "invalid on_store_error: {other} (expected \"fail\" or \"assume_stale\")"
            )),
        }
    }
}
