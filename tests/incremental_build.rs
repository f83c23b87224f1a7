// tests/incremental_build.rs

mod common;

use std::sync::Arc;

use common::{executor, init_tracing, with_timeout};
use dagbuild::dag::{Task, TaskState};
use dagbuild::engine::{BuildOptions, BuildStatus, Executor};
use dagbuild::fingerprint::{FingerprintStore, MemoryStore, StaleReason, Staleness};
use dagbuild::fs::mock::MockFileSystem;
use dagbuild::product::{Product, RelationDialect, RelationKind};
use dagbuild::types::StoreErrorPolicy;
use dagbuild_test_utils::builders::{DagBuilder, chain, file_task};
use dagbuild_test_utils::fake_runner::RecordingRunner;

fn stale(reason: StaleReason) -> Staleness {
    Staleness::Stale(reason)
}

#[tokio::test]
async fn first_build_runs_every_task_in_dependency_order() {
    init_tracing();

    let builder = chain(3);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();

    let report = with_timeout(executor(runner.clone(), store.clone(), 4).build(&mut dag))
        .await
        .expect("build");

    assert_eq!(report.status(), BuildStatus::Success);
    assert_eq!(report.executed(), vec!["t0", "t1", "t2"]);
    assert_eq!(runner.executed(), vec!["t0", "t1", "t2"]);
    assert_eq!(report.task("t0").unwrap().staleness, stale(StaleReason::NeverRun));
    assert_eq!(store.len(), 3);
    assert!(dag.tasks().all(|t| t.state() == TaskState::Executed));
}

#[tokio::test]
async fn unchanged_pipeline_is_skipped_entirely() {
    init_tracing();

    let builder = chain(3);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();
    let exec = executor(runner.clone(), store.clone(), 2);

    with_timeout(exec.build(&mut dag)).await.expect("first build");
    runner.clear();

    let report = with_timeout(exec.build(&mut dag)).await.expect("second build");

    assert!(runner.executed().is_empty());
    assert_eq!(report.skipped(), vec!["t0", "t1", "t2"]);
    assert!(report.is_success());
    assert!(report.tasks().iter().all(|t| t.staleness == Staleness::UpToDate));
    assert!(dag.tasks().all(|t| t.state() == TaskState::Skipped));
}

#[tokio::test]
async fn definition_change_propagates_downstream() {
    init_tracing();

    let fs = MockFileSystem::new();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let exec = executor(runner.clone(), store.clone(), 2);

    let mut dag = chain(3).with_fs(fs.clone()).build();
    with_timeout(exec.build(&mut dag)).await.expect("first build");
    runner.clear();

    let mut changed = DagBuilder::new()
        .with_fs(fs.clone())
        .task(file_task("t0", "t0.out", &[]))
        .task(Task::new("t1", "build t1 --faster").with_products(Product::file("t1.out")).with_upstream("t0"))
        .task(file_task("t2", "t2.out", &["t1"]))
        .build();

    let report = with_timeout(exec.build(&mut changed)).await.expect("second build");

    assert_eq!(runner.executed(), vec!["t1", "t2"]);
    assert_eq!(report.skipped(), vec!["t0"]);
    assert_eq!(report.task("t1").unwrap().staleness, stale(StaleReason::DefinitionChanged));
    assert_eq!(
        report.task("t2").unwrap().staleness,
        stale(StaleReason::UpstreamChanged(vec!["t1".into()]))
    );
}

#[tokio::test]
async fn parameter_change_marks_task_stale() {
    init_tracing();

    let fs = MockFileSystem::new();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let exec = executor(runner.clone(), store.clone(), 1);

    let task = |n: &str| {
        Task::new("fit", "train model")
            .with_products(Product::file("model.bin"))
            .with_param("epochs", n)
    };

    let mut dag = DagBuilder::new().with_fs(fs.clone()).task(task("10")).build();
    with_timeout(exec.build(&mut dag)).await.expect("first build");

    let mut same = DagBuilder::new().with_fs(fs.clone()).task(task("10")).build();
    let report = with_timeout(exec.build(&mut same)).await.expect("same params");
    assert_eq!(report.skipped(), vec!["fit"]);

    let mut changed = DagBuilder::new().with_fs(fs.clone()).task(task("20")).build();
    let report = with_timeout(exec.build(&mut changed)).await.expect("new params");
    assert_eq!(report.executed(), vec!["fit"]);
    assert_eq!(report.task("fit").unwrap().staleness, stale(StaleReason::DefinitionChanged));
}

#[tokio::test]
async fn missing_product_reruns_task_and_its_downstream() {
    init_tracing();

    let builder = chain(3);
    let fs = builder.fs();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();
    let exec = executor(runner.clone(), store.clone(), 2);

    with_timeout(exec.build(&mut dag)).await.expect("first build");
    runner.clear();

    assert!(fs.remove_file("/project/t1.out"));
    let report = with_timeout(exec.build(&mut dag)).await.expect("second build");

    assert_eq!(runner.executed(), vec!["t1", "t2"]);
    assert_eq!(report.state_of("t0"), Some(TaskState::Skipped));
    assert_eq!(
        report.task("t1").unwrap().staleness,
        stale(StaleReason::ProductMissing("File('t1.out')".into()))
    );
    assert_eq!(
        report.task("t2").unwrap().staleness,
        stale(StaleReason::UpstreamStale(vec!["t1".into()]))
    );
}

#[tokio::test]
async fn removed_upstream_edge_marks_task_stale() {
    init_tracing();

    let fs = MockFileSystem::new();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let exec = executor(runner.clone(), store.clone(), 2);

    let mut dag = chain(2).with_fs(fs.clone()).build();
    with_timeout(exec.build(&mut dag)).await.expect("first build");

    let mut detached = DagBuilder::new()
        .with_fs(fs.clone())
        .task(file_task("t0", "t0.out", &[]))
        .task(file_task("t1", "t1.out", &[]))
        .build();
    let report = with_timeout(exec.build(&mut detached)).await.expect("second build");

    assert_eq!(report.skipped(), vec!["t0"]);
    assert_eq!(
        report.task("t1").unwrap().staleness,
        stale(StaleReason::UpstreamChanged(vec!["t0".into()]))
    );
}

#[tokio::test]
async fn force_runs_everything() {
    init_tracing();

    let builder = chain(3);
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();

    with_timeout(executor(runner.clone(), store.clone(), 2).build(&mut dag))
        .await
        .expect("first build");
    runner.clear();

    let forced = Executor::new(Arc::new(runner.clone()), store.clone()).with_options(BuildOptions {
        concurrency: 2,
        force: true,
        on_store_error: StoreErrorPolicy::Fail,
    });
    let report = with_timeout(forced.build(&mut dag)).await.expect("forced build");

    assert_eq!(runner.executed(), vec!["t0", "t1", "t2"]);
    assert!(report.tasks().iter().all(|t| t.staleness == stale(StaleReason::Forced)));
}

#[tokio::test]
async fn plan_classifies_without_running() {
    init_tracing();

    let builder = chain(2);
    let fs = builder.fs();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();
    let exec = executor(runner.clone(), store.clone(), 2);

    let plan = exec.plan(&mut dag).expect("plan");
    assert_eq!(
        plan,
        vec![
            ("t0".to_string(), stale(StaleReason::NeverRun)),
            ("t1".to_string(), stale(StaleReason::NeverRun)),
        ]
    );
    assert!(runner.executed().is_empty());
    assert!(store.is_empty());

    with_timeout(exec.build(&mut dag)).await.expect("build");
    fs.remove_file("/project/t0.out");

    let plan = exec.plan(&mut dag).expect("plan");
    assert_eq!(plan[0].1, stale(StaleReason::ProductMissing("File('t0.out')".into())));
    assert_eq!(plan[1].1, stale(StaleReason::UpstreamStale(vec!["t0".into()])));
}

#[tokio::test]
async fn relation_products_are_checked_through_their_client() {
    init_tracing();

    let builder = DagBuilder::new().with_client(RelationDialect::Postgres).task(
        Task::new("load", "insert into raw.events").with_products(Product::relation(
            RelationDialect::Postgres,
            Some("raw"),
            "events",
            RelationKind::Table,
        )),
    );
    let relations = builder.relations();
    let runner = RecordingRunner::new().with_relations(relations.clone());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();
    let exec = executor(runner.clone(), store.clone(), 1);

    with_timeout(exec.build(&mut dag)).await.expect("first build");
    let report = with_timeout(exec.build(&mut dag)).await.expect("second build");
    assert_eq!(report.skipped(), vec!["load"]);

    assert!(relations.drop_relation(Some("raw"), "events"));
    let report = with_timeout(exec.build(&mut dag)).await.expect("third build");
    assert_eq!(report.executed(), vec!["load"]);
    assert_eq!(
        report.task("load").unwrap().staleness,
        stale(StaleReason::ProductMissing("PostgresRelation(('raw', 'events', 'table'))".into()))
    );
}

#[tokio::test]
async fn diamond_dispatches_in_declaration_order() {
    init_tracing();

    let builder = DagBuilder::new()
        .task(file_task("a", "a.out", &[]))
        .task(file_task("c", "c.out", &["a"]))
        .task(file_task("b", "b.out", &["a"]))
        .task(file_task("d", "d.out", &["b", "c"]));
    let runner = RecordingRunner::new().with_fs(builder.fs());
    let store = Arc::new(MemoryStore::new());
    let mut dag = builder.build();

    let report = with_timeout(executor(runner.clone(), store, 1).build(&mut dag))
        .await
        .expect("build");

    assert!(report.is_success());
    assert_eq!(runner.executed(), vec!["a", "c", "b", "d"]);
}

#[tokio::test]
async fn prune_drops_records_of_removed_tasks() {
    init_tracing();

    let fs = MockFileSystem::new();
    let runner = RecordingRunner::new().with_fs(fs.clone());
    let store = Arc::new(MemoryStore::new());
    let exec = executor(runner, store.clone(), 2);

    let mut dag = chain(3).with_fs(fs.clone()).build();
    with_timeout(exec.build(&mut dag)).await.expect("build");
    assert_eq!(store.len(), 3);

    let smaller = chain(2).with_fs(fs).build();
    assert_eq!(exec.prune(&smaller).expect("prune"), 1);
    assert!(store.get("t2").expect("get").is_none());
    assert!(store.get("t1").expect("get").is_some());
}
