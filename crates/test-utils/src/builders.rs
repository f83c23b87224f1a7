#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use dagbuild::dag::{Dag, Task};
use dagbuild::fs::mock::MockFileSystem;
use dagbuild::product::{MemoryRelationClient, Product, ProductBackends, RelationDialect};

/// Root every test DAG is anchored at.
pub const TEST_ROOT: &str = "/project";

/// Builder for a [`Dag`] backed by a [`MockFileSystem`] and a shared
/// in-memory relation client.
///
/// Grab the handles with [`DagBuilder::fs`] / [`DagBuilder::relations`]
/// before calling [`DagBuilder::build`] to inspect or seed products.
pub struct DagBuilder {
    root: PathBuf,
    fs: MockFileSystem,
    relations: MemoryRelationClient,
    dialects: Vec<RelationDialect>,
    tasks: Vec<Task>,
}

impl DagBuilder {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(TEST_ROOT),
            fs: MockFileSystem::new(),
            relations: MemoryRelationClient::new(),
            dialects: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Share a filesystem with another builder, e.g. to rebuild a modified
    /// pipeline against the products of an earlier build.
    pub fn with_fs(mut self, fs: MockFileSystem) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_relations(mut self, relations: MemoryRelationClient) -> Self {
        self.relations = relations;
        self
    }

    /// Register the shared relation client for `dialect`.
    pub fn with_client(mut self, dialect: RelationDialect) -> Self {
        self.dialects.push(dialect);
        self
    }

    pub fn with_all_clients(self) -> Self {
        self.with_client(RelationDialect::Sql)
            .with_client(RelationDialect::Postgres)
            .with_client(RelationDialect::Sqlite)
            .with_client(RelationDialect::GenericSql)
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn fs(&self) -> MockFileSystem {
        self.fs.clone()
    }

    pub fn relations(&self) -> MemoryRelationClient {
        self.relations.clone()
    }

    pub fn backends(&self) -> ProductBackends {
        let mut backends =
            ProductBackends::new(&self.root).with_filesystem(Arc::new(self.fs.clone()));
        for dialect in &self.dialects {
            backends = backends.with_client(*dialect, Arc::new(self.relations.clone()));
        }
        backends
    }

    pub fn build(self) -> Dag {
        let mut dag = Dag::with_backends(self.backends());
        for task in self.tasks {
            dag.add_task(task).expect("duplicate task name in DagBuilder");
        }
        dag
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Task producing the single file `product`, depending on `upstream`.
pub fn file_task(name: &str, product: &str, upstream: &[&str]) -> Task {
    let mut task = Task::new(name, format!("build {name}")).with_products(Product::file(product));
    for up in upstream {
        task.add_upstream(*up);
    }
    task
}

/// Task without products, depending on `upstream`.
pub fn plain_task(name: &str, upstream: &[&str]) -> Task {
    let mut task = Task::new(name, format!("run {name}"));
    for up in upstream {
        task.add_upstream(*up);
    }
    task
}

/// Linear chain `t0 -> t1 -> ... -> t{n-1}`, each producing `t{i}.out`.
pub fn chain(n: usize) -> DagBuilder {
    let mut builder = DagBuilder::new();
    for i in 0..n {
        let name = format!("t{i}");
        let product = format!("{name}.out");
        let prev = i.checked_sub(1).map(|p| format!("t{p}"));
        let ups: Vec<&str> = prev.iter().map(String::as_str).collect();
        builder = builder.task(file_task(&name, &product, &ups));
    }
    builder
}
