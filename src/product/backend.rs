// src/product/backend.rs

//! Product-existence checks.
//!
//! A DAG owns one [`ProductBackends`] value: the filesystem that file
//! products live on and one [`RelationClient`] per SQL dialect. There is no
//! process-wide client registry; two DAGs never share backends unless the
//! caller passes the same `Arc`s to both.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tracing::trace;

use crate::fs::{FileSystem, RealFileSystem};
use crate::product::{Product, ProductId, Relation, RelationDialect, path};

/// Answers existence queries for relations of one dialect.
pub trait RelationClient: Send + Sync + fmt::Debug {
    fn exists(&self, relation: &Relation) -> Result<bool>;
}

/// Relation client backed by an in-memory set of `(schema, name)` pairs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelationClient {
    relations: Arc<Mutex<HashSet<(Option<String>, String)>>>,
}

impl MemoryRelationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, schema: Option<&str>, name: &str) {
        let mut rel = self.relations.lock().unwrap_or_else(|e| e.into_inner());
        rel.insert((schema.map(str::to_string), name.to_string()));
    }

    pub fn drop_relation(&self, schema: Option<&str>, name: &str) -> bool {
        let mut rel = self.relations.lock().unwrap_or_else(|e| e.into_inner());
        rel.remove(&(schema.map(str::to_string), name.to_string()))
    }
}

impl RelationClient for MemoryRelationClient {
    fn exists(&self, relation: &Relation) -> Result<bool> {
        let rel = self.relations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rel.contains(&(relation.schema.clone(), relation.name.clone())))
    }
}

/// Backends the DAG uses to resolve and check its products.
#[derive(Clone)]
pub struct ProductBackends {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    clients: BTreeMap<RelationDialect, Arc<dyn RelationClient>>,
}

impl fmt::Debug for ProductBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductBackends")
            .field("root", &self.root)
            .field("fs", &self.fs)
            .field("dialects", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProductBackends {
    /// Backends rooted at `root`, using the real filesystem and no relation
    /// clients.
    ///
    /// A relative `root` is resolved against the current working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            path::absolutize(&root, Path::new(""))
        } else {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
            path::absolutize(&cwd, &root)
        };

        Self {
            root,
            fs: Arc::new(RealFileSystem),
            clients: BTreeMap::new(),
        }
    }

    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_client(mut self, dialect: RelationDialect, client: Arc<dyn RelationClient>) -> Self {
        self.clients.insert(dialect, client);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn has_client(&self, dialect: RelationDialect) -> bool {
        self.clients.contains_key(&dialect)
    }

    pub fn identity(&self, product: &Product) -> ProductId {
        product.identity(&self.root)
    }

    /// Absolute location of a file product.
    pub fn resolve_path(&self, p: &Path) -> PathBuf {
        path::absolutize(&self.root, p)
    }

    /// Whether the artifact behind `product` exists in its backing store.
    pub fn exists(&self, product: &Product) -> Result<bool> {
        let found = match product {
            Product::File(p) => {
                let path = self.resolve_path(p);
                self.fs
                    .exists(&path)
                    .with_context(|| format!("checking {}", path.display()))?
            }
            Product::Relation(r) => {
                let client = self
                    .clients
                    .get(&r.dialect)
                    .ok_or_else(|| anyhow!("no client configured for {}", r.dialect))?;
                client.exists(r)?
            }
        };
        trace!(%product, found, "checked product existence");
        Ok(found)
    }
}

impl Default for ProductBackends {
    fn default() -> Self {
        Self::new(".")
    }
}
