// src/fingerprint/store.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::dag::TaskName;
use crate::errors::StoreError;
use crate::fingerprint::hash::name_key;

/// Relative path (from the store root) to the record directory.
pub const RECORD_DIR: &str = "fingerprints";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    Success,
}

/// What is remembered about a task's last successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub task: TaskName,
    pub definition_fingerprint: String,
    pub upstream_fingerprints: BTreeMap<TaskName, String>,
    pub fingerprint: String,
    pub outcome: RecordOutcome,
    /// Seconds since the Unix epoch. Informational only; staleness never
    /// looks at it.
    pub timestamp: u64,
}

impl FingerprintRecord {
    pub fn success(
        task: impl Into<TaskName>,
        definition_fingerprint: impl Into<String>,
        upstream_fingerprints: BTreeMap<TaskName, String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            task: task.into(),
            definition_fingerprint: definition_fingerprint.into(),
            upstream_fingerprints,
            fingerprint: fingerprint.into(),
            outcome: RecordOutcome::Success,
            timestamp,
        }
    }
}

/// Durable per-task storage for fingerprint records.
///
/// Implementations must make `put` atomic per record: a reader sees either
/// the previous record or the new one, never a mix. Records of different
/// tasks are independent, so no cross-task locking is required.
pub trait FingerprintStore: Send + Sync + Debug {
    fn get(&self, task: &str) -> Result<Option<FingerprintRecord>, StoreError>;
    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError>;
    /// Remove records of tasks not in `active_tasks`. Returns how many
    /// records were removed.
    fn prune(&self, active_tasks: &[&str]) -> Result<usize, StoreError>;
}

/// Stores one TOML file per task under `<root>/fingerprints/`.
///
/// File names are derived from a hash of the task name; the name is also
/// stored inside the record and checked on every read.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(RECORD_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, task: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", name_key(task)))
    }

    fn read_record(path: &Path) -> Result<FingerprintRecord, StoreError> {
        let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_record(path, &contents)
    }

    fn parse_record(path: &Path, contents: &str) -> Result<FingerprintRecord, StoreError> {
        toml::from_str(contents).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl FingerprintStore for FileStore {
    fn get(&self, task: &str) -> Result<Option<FingerprintRecord>, StoreError> {
        let path = self.record_path(task);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let record = Self::parse_record(&path, &contents)?;
        if record.task != task {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("record belongs to task '{}', expected '{task}'", record.task),
            });
        }
        Ok(Some(record))
    }

    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| StoreError::Io { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let body = toml::to_string(record).map_err(|e| StoreError::Serialize {
            task: record.task.clone(),
            reason: e.to_string(),
        })?;

        // Write to a sibling temp file and rename over the record so that a
        // crash mid-write leaves the previous record intact.
        let path = self.record_path(&record.task);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err(&self.dir))?;
        tmp.write_all(body.as_bytes()).map_err(io_err(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_err(&path))?;
        tmp.persist(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(task = %record.task, fingerprint = %record.fingerprint, "stored fingerprint (file)");
        Ok(())
    }

    fn prune(&self, active_tasks: &[&str]) -> Result<usize, StoreError> {
        let present = self.dir.try_exists().map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        if !present {
            return Ok(0);
        }

        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }

            let task = match Self::read_record(&path) {
                Ok(record) => record.task,
                Err(err) => {
                    warn!(path = ?path, error = %err, "skipping unreadable record while pruning");
                    continue;
                }
            };

            if !active_tasks.contains(&task.as_str()) {
                fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "pruned fingerprints of removed tasks (file)");
        }
        Ok(removed)
    }
}

/// Stores records in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<TaskName, FingerprintRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FingerprintStore for MemoryStore {
    fn get(&self, task: &str) -> Result<Option<FingerprintRecord>, StoreError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(task).cloned())
    }

    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.task.clone(), record.clone());
        debug!(task = %record.task, fingerprint = %record.fingerprint, "stored fingerprint (memory)");
        Ok(())
    }

    fn prune(&self, active_tasks: &[&str]) -> Result<usize, StoreError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let initial_len = records.len();
        records.retain(|k, _| active_tasks.contains(&k.as_str()));
        let removed = initial_len - records.len();
        if removed > 0 {
            info!(removed, "pruned fingerprints of removed tasks (memory)");
        }
        Ok(removed)
    }
}
