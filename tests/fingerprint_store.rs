// tests/fingerprint_store.rs

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use common::{executor, init_tracing, with_timeout};
use dagbuild::dag::{AbortReason, TaskState};
use dagbuild::engine::{BuildOptions, Executor};
use dagbuild::errors::{DagError, StoreError};
use dagbuild::fingerprint::store::RECORD_DIR;
use dagbuild::fingerprint::{FileStore, FingerprintRecord, FingerprintStore, StaleReason, Staleness};
use dagbuild::types::StoreErrorPolicy;
use dagbuild_test_utils::builders::chain;
use dagbuild_test_utils::fake_runner::{FailingStore, RecordingRunner};
use tempfile::TempDir;

fn record(task: &str, fingerprint: &str) -> FingerprintRecord {
    let mut upstream = BTreeMap::new();
    upstream.insert("parent".to_string(), "abc".to_string());
    FingerprintRecord::success(task, "def", upstream, fingerprint)
}

#[test]
fn file_store_round_trips_records() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path());

    assert!(store.get("train").unwrap().is_none());

    let rec = record("train", "fp-1");
    store.put(&rec).unwrap();
    assert_eq!(store.get("train").unwrap(), Some(rec));

    let newer = record("train", "fp-2");
    store.put(&newer).unwrap();
    assert_eq!(store.get("train").unwrap().unwrap().fingerprint, "fp-2");

    // One record per task, nothing left behind by the atomic write.
    let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn file_store_keeps_names_apart() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path());

    store.put(&record("a/b", "one")).unwrap();
    store.put(&record("a_b", "two")).unwrap();

    assert_eq!(store.get("a/b").unwrap().unwrap().fingerprint, "one");
    assert_eq!(store.get("a_b").unwrap().unwrap().fingerprint, "two");
}

#[test]
fn corrupt_record_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path());
    store.put(&record("task", "fp")).unwrap();

    let path = fs::read_dir(store.dir()).unwrap().next().unwrap().unwrap().path();
    fs::write(&path, "this is = = not toml").unwrap();

    let err = store.get("task").unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
}

#[test]
fn file_store_prunes_inactive_tasks() {
    let tmp = TempDir::new().unwrap();
    let store = FileStore::new(tmp.path());
    for name in ["keep", "drop1", "drop2"] {
        store.put(&record(name, "fp")).unwrap();
    }

    assert_eq!(store.prune(&["keep"]).unwrap(), 2);
    assert!(store.get("keep").unwrap().is_some());
    assert!(store.get("drop1").unwrap().is_none());
    assert_eq!(store.prune(&["keep"]).unwrap(), 0);
}

#[test]
fn blocked_record_directory_is_an_error_not_a_miss() {
    let tmp = TempDir::new().unwrap();
    // A plain file where the record directory should be.
    fs::write(tmp.path().join(RECORD_DIR), "not a directory").unwrap();
    let store = FileStore::new(tmp.path());

    let err = store.get("a").unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }), "got {err:?}");

    let err = store.prune(&["a"]).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }), "got {err:?}");
}

#[tokio::test]
async fn blocked_record_directory_fails_the_build() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(RECORD_DIR), "not a directory").unwrap();

    let builder = chain(2);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let mut dag = builder.build();

    let store = Arc::new(FileStore::new(tmp.path()));
    let err = with_timeout(executor(runner.clone(), store, 2).build(&mut dag))
        .await
        .unwrap_err();

    assert!(matches!(err, DagError::Store(StoreError::Io { .. })), "got {err:?}");
    assert!(runner.executed().is_empty());
}

#[tokio::test]
async fn records_survive_a_restart() {
    init_tracing();

    let tmp = TempDir::new().unwrap();
    let builder = chain(3);
    let fs = builder.fs();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let mut dag = builder.build();

    {
        let store = Arc::new(FileStore::new(tmp.path()));
        let report = with_timeout(executor(runner.clone(), store, 2).build(&mut dag))
            .await
            .expect("first build");
        assert!(report.is_success());
    }

    runner.clear();
    let store = Arc::new(FileStore::new(tmp.path()));
    let mut reloaded = chain(3).with_fs(fs).build();
    let report = with_timeout(executor(runner.clone(), store, 2).build(&mut reloaded))
        .await
        .expect("second build");

    assert!(runner.executed().is_empty());
    assert_eq!(report.skipped(), vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn unreadable_store_fails_the_build_by_default() {
    init_tracing();

    let builder = chain(2);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(FailingStore::new());
    store.fail_reads(true);
    let mut dag = builder.build();

    let err = with_timeout(executor(runner.clone(), store, 2).build(&mut dag))
        .await
        .unwrap_err();

    assert!(matches!(err, DagError::Store(StoreError::Io { .. })), "got {err:?}");
    assert!(runner.executed().is_empty());
}

#[tokio::test]
async fn unreadable_store_can_assume_stale() {
    init_tracing();

    let builder = chain(2);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(FailingStore::new());
    store.fail_reads(true);
    let mut dag = builder.build();

    let exec = Executor::new(Arc::new(runner.clone()), store.clone()).with_options(BuildOptions {
        concurrency: 1,
        force: false,
        on_store_error: StoreErrorPolicy::AssumeStale,
    });
    let report = with_timeout(exec.build(&mut dag)).await.expect("build");

    assert!(report.is_success());
    assert_eq!(runner.executed(), vec!["t0", "t1"]);
    assert!(matches!(
        report.task("t0").unwrap().staleness,
        Staleness::Stale(StaleReason::StoreUnavailable(_))
    ));
    // Writes still work, so the next healthy read sees the records.
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn failed_fingerprint_write_stops_the_build() {
    init_tracing();

    let builder = chain(3);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(FailingStore::new());
    store.fail_writes(true);
    let mut dag = builder.build();

    let err = with_timeout(executor(runner.clone(), store.clone(), 1).build(&mut dag))
        .await
        .unwrap_err();

    assert!(matches!(err, DagError::Store(_)), "got {err:?}");
    assert_eq!(runner.executed(), vec!["t0"]);
    assert!(store.is_empty());
    assert_eq!(dag.get("t0").unwrap().state(), TaskState::Errored);
    assert_eq!(
        dag.get("t1").unwrap().state(),
        TaskState::Aborted(AbortReason::UpstreamFailed)
    );
    assert_eq!(
        dag.get("t2").unwrap().state(),
        TaskState::Aborted(AbortReason::UpstreamFailed)
    );
}
