use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagbuild::engine::{ScheduledTask, TaskOutcome};
use dagbuild::errors::StoreError;
use dagbuild::exec::{Runner, RunnerFuture};
use dagbuild::fingerprint::{FingerprintRecord, FingerprintStore, MemoryStore};
use dagbuild::fs::mock::MockFileSystem;
use dagbuild::product::{MemoryRelationClient, Product};

/// A fake runner that:
/// - records which tasks were run, in dispatch order
/// - fails the tasks it was told to fail
/// - on success, materializes the task's products in the mock backends
/// - tracks how many tasks were running at the same time
#[derive(Clone, Default)]
pub struct RecordingRunner {
    executed: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    panicking: Arc<Mutex<HashSet<String>>>,
    fs: Option<MockFileSystem>,
    relations: Option<MemoryRelationClient>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create file products in `fs` when a task succeeds.
    pub fn with_fs(mut self, fs: MockFileSystem) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Create relation products in `relations` when a task succeeds.
    pub fn with_relations(mut self, relations: MemoryRelationClient) -> Self {
        self.relations = Some(relations);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail(&self, task: &str) {
        self.failing.lock().unwrap().insert(task.to_string());
    }

    pub fn heal(&self, task: &str) {
        self.failing.lock().unwrap().remove(task);
    }

    pub fn panic_on(&self, task: &str) {
        self.panicking.lock().unwrap().insert(task.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.executed.lock().unwrap().clear();
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn materialize(&self, task: &ScheduledTask) {
        for p in &task.products {
            match (&p.product, &p.path) {
                (Product::File(_), Some(path)) => {
                    if let Some(fs) = &self.fs {
                        fs.add_file(path);
                    }
                }
                (Product::Relation(rel), _) => {
                    if let Some(relations) = &self.relations {
                        relations.create(rel.schema.as_deref(), &rel.name);
                    }
                }
                _ => {}
            }
        }
    }
}

impl Runner for RecordingRunner {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> RunnerFuture<'a> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(task.name.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            } else {
                tokio::task::yield_now().await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panicking.lock().unwrap().contains(&task.name) {
                panic!("runner exploded on {}", task.name);
            }
            if self.failing.lock().unwrap().contains(&task.name) {
                return TaskOutcome::Failed(format!("{} failed on purpose", task.name));
            }

            self.materialize(task);
            TaskOutcome::Success
        })
    }
}

/// In-memory store whose reads and writes can be switched to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn io_error(task: &str) -> StoreError {
        StoreError::Io {
            path: Path::new("/unavailable").join(task),
            source: std::io::Error::other("store unavailable"),
        }
    }
}

impl FingerprintStore for FailingStore {
    fn get(&self, task: &str) -> Result<Option<FingerprintRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::io_error(task));
        }
        self.inner.get(task)
    }

    fn put(&self, record: &FingerprintRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::io_error(&record.task));
        }
        self.inner.put(record)
    }

    fn prune(&self, active_tasks: &[&str]) -> Result<usize, StoreError> {
        self.inner.prune(active_tasks)
    }
}
