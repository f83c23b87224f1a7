// tests/config_loading.rs

use std::io::Write;

use dagbuild::config::load_and_validate;
use dagbuild::dag::{Dag, RenderViolation};
use dagbuild::errors::DagError;
use dagbuild::product::{Product, ProductBackends, Products, RelationDialect, RelationKind};
use dagbuild::types::{StoreErrorPolicy, StoreMode};
use tempfile::NamedTempFile;

fn pipeline(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn expect_config_error(contents: &str, needle: &str) {
    let file = pipeline(contents);
    match load_and_validate(file.path()) {
        Err(DagError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} does not mention {needle:?}")
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn full_pipeline_file_is_loaded() {
    let file = pipeline(
        r#"
[config]
concurrency = 3
store = "memory"
store_dir = ".state"
on_store_error = "assume_stale"

[[task]]
name = "load"
cmd = "python load.py"
product = "data/raw.csv"
params = { sample = 0.5, source = "s3" }

[[task]]
name = "clean"
cmd = "python clean.py"
upstream = ["load"]
products = { clean = "data/clean.csv", report = "data/report.html" }

[[task]]
name = "publish"
cmd = "psql -f publish.sql"
upstream = ["clean"]

[[task.relations]]
dialect = "postgres"
schema = "analytics"
name = "clean_data"
kind = "view"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid pipeline");
    assert_eq!(cfg.config.concurrency, Some(3));
    assert_eq!(cfg.config.effective_concurrency(), 3);
    assert_eq!(cfg.config.store, StoreMode::Memory);
    assert_eq!(cfg.config.store_dir, ".state");
    assert_eq!(cfg.config.on_store_error, StoreErrorPolicy::AssumeStale);

    let names: Vec<&str> = cfg.task.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["load", "clean", "publish"]);

    let load = cfg.task[0].to_task();
    assert_eq!(load.declared_products(), &Products::Single(Product::file("data/raw.csv")));
    assert_eq!(load.params().get("source").map(String::as_str), Some("s3"));
    assert_eq!(load.params().get("sample").map(String::as_str), Some("0.5"));

    let clean = cfg.task[1].to_task();
    assert_eq!(clean.upstream(), ["load"]);
    assert_eq!(clean.declared_products().get("report"), Some(&Product::file("data/report.html")));

    let publish = cfg.task[2].to_task();
    assert_eq!(
        publish.declared_products(),
        &Products::Single(Product::relation(
            RelationDialect::Postgres,
            Some("analytics"),
            "clean_data",
            RelationKind::View,
        ))
    );
}

#[test]
fn defaults_apply_when_config_section_is_missing() {
    let file = pipeline(
        r#"
[[task]]
name = "only"
cmd = "true"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid pipeline");
    assert_eq!(cfg.config.store, StoreMode::File);
    assert_eq!(cfg.config.store_dir, ".dagbuild");
    assert_eq!(cfg.config.on_store_error, StoreErrorPolicy::Fail);
    assert!(cfg.config.effective_concurrency() >= 1);
    assert!(cfg.task[0].to_task().declared_products().is_empty());
}

#[test]
fn product_and_relations_become_a_metaproduct() {
    let file = pipeline(
        r#"
[[task]]
name = "mixed"
cmd = "make"
product = "out.txt"

[[task.relations]]
key = "table"
dialect = "sqlite"
name = "results"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid pipeline");
    let task = cfg.task[0].to_task();
    let products = task.declared_products();
    assert_eq!(products.get("product"), Some(&Product::file("out.txt")));
    assert_eq!(
        products.get("table"),
        Some(&Product::relation(RelationDialect::Sqlite, None, "results", RelationKind::Table))
    );
}

#[test]
fn empty_pipeline_is_rejected() {
    expect_config_error("[config]\nconcurrency = 2\n", "at least one [[task]]");
}

#[test]
fn zero_concurrency_is_rejected() {
    expect_config_error(
        r#"
[config]
concurrency = 0

[[task]]
name = "a"
cmd = "true"
"#,
        "concurrency must be >= 1",
    );
}

#[test]
fn duplicate_task_names_are_rejected() {
    expect_config_error(
        r#"
[[task]]
name = "a"
cmd = "true"

[[task]]
name = "a"
cmd = "false"
"#,
        "declared more than once",
    );
}

#[test]
fn empty_command_is_rejected() {
    expect_config_error(
        r#"
[[task]]
name = "a"
cmd = "  "
"#,
        "empty `cmd`",
    );
}

#[test]
fn product_and_products_are_exclusive() {
    expect_config_error(
        r#"
[[task]]
name = "a"
cmd = "true"
product = "x"
products = { y = "y" }
"#,
        "both `product` and `products`",
    );
}

#[test]
fn relations_sharing_a_name_need_explicit_keys() {
    expect_config_error(
        r#"
[[task]]
name = "load"
cmd = "true"

[[task.relations]]
dialect = "sqlite"
schema = "a"
name = "users"

[[task.relations]]
dialect = "sqlite"
schema = "b"
name = "users"
"#,
        "product key 'users'",
    );
}

#[test]
fn file_and_relation_keys_must_not_collide() {
    expect_config_error(
        r#"
[[task]]
name = "load"
cmd = "true"
products = { users = "users.csv" }

[[task.relations]]
dialect = "postgres"
name = "users"
"#,
        "product key 'users'",
    );

    expect_config_error(
        r#"
[[task]]
name = "load"
cmd = "true"
product = "out.txt"

[[task.relations]]
key = "product"
dialect = "sqlite"
name = "results"
"#,
        "product key 'product'",
    );
}

#[test]
fn keyed_relations_with_the_same_name_are_all_kept() {
    let file = pipeline(
        r#"
[[task]]
name = "load"
cmd = "true"

[[task.relations]]
key = "users_a"
dialect = "sqlite"
schema = "a"
name = "users"

[[task.relations]]
key = "users_b"
dialect = "sqlite"
schema = "b"
name = "users"
"#,
    );

    let cfg = load_and_validate(file.path()).expect("valid pipeline");
    let task = cfg.task[0].to_task();
    assert_eq!(task.products().count(), 2);
    assert_eq!(
        task.declared_products().get("users_b"),
        Some(&Product::relation(RelationDialect::Sqlite, Some("b"), "users", RelationKind::Table))
    );
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = pipeline("[[task]\nname = ");
    assert!(matches!(load_and_validate(file.path()), Err(DagError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Pipeline.toml").unwrap_err();
    assert!(matches!(err, DagError::IoError(_)));
}

#[test]
fn graph_errors_surface_at_render_not_load() {
    let file = pipeline(
        r#"
[[task]]
name = "a"
cmd = "true"
upstream = ["b"]

[[task]]
name = "b"
cmd = "true"
upstream = ["a"]
"#,
    );

    let cfg = load_and_validate(file.path()).expect("file-level checks pass");
    let mut dag = Dag::from_config(&cfg, ProductBackends::new("/work")).expect("dag");
    let err = dag.render().unwrap_err();
    assert!(matches!(err.violations(), [RenderViolation::Cycle(_)]));
    assert_eq!(err.to_string(), "cycle detected in task DAG: a -> b -> a");
}

#[test]
fn enum_values_parse_from_strings() {
    assert_eq!("memory".parse::<StoreMode>(), Ok(StoreMode::Memory));
    assert_eq!(" File ".parse::<StoreMode>(), Ok(StoreMode::File));
    assert!("disk".parse::<StoreMode>().is_err());

    assert_eq!("assume-stale".parse::<StoreErrorPolicy>(), Ok(StoreErrorPolicy::AssumeStale));
    assert_eq!("fail".parse::<StoreErrorPolicy>(), Ok(StoreErrorPolicy::Fail));
    assert!("ignore".parse::<StoreErrorPolicy>().is_err());
}
