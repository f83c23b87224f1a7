// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::Task;
use crate::product::{Product, Products, RelationDialect, RelationKind};
use crate::types::{StoreErrorPolicy, StoreMode};

/// Pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// concurrency = 4
/// store = "file"
///
/// [[task]]
/// name = "load"
/// cmd = "python load.py"
/// product = "data/raw.csv"
///
/// [[task]]
/// name = "clean"
/// cmd = "python clean.py"
/// upstream = ["load"]
/// products = { clean = "data/clean.csv", report = "data/report.html" }
/// ```
///
/// Tasks are an array of tables so that declaration order survives
/// parsing; it is the tie-break for scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// Validated pipeline file. Only constructible through
/// `PipelineFile::try_from(RawPipelineFile)`.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub config: ConfigSection,
    pub task: Vec<TaskConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: Vec<TaskConfig>) -> Self {
        Self { config, task }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks executing at once. Defaults to the available
    /// parallelism of the machine.
    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default)]
    pub store: StoreMode,

    /// Directory (relative to the pipeline file) holding build metadata.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    #[serde(default)]
    pub on_store_error: StoreErrorPolicy,
}

fn default_store_dir() -> String {
    ".dagbuild".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency: None,
            store: StoreMode::default(),
            store_dir: default_store_dir(),
            on_store_error: StoreErrorPolicy::default(),
        }
    }
}

impl ConfigSection {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Shell command; also the task's definition for fingerprinting.
    pub cmd: String,

    #[serde(default)]
    pub upstream: Vec<String>,

    /// Single file product.
    #[serde(default)]
    pub product: Option<String>,

    /// Named file products (metaproduct).
    #[serde(default)]
    pub products: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub relations: Vec<RelationConfig>,

    /// Parameters; part of the fingerprint and exported to the command.
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

/// A relation product inside `[[task]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationConfig {
    /// Metaproduct key; defaults to the relation name.
    #[serde(default)]
    pub key: Option<String>,
    pub dialect: RelationDialect,
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
    #[serde(default)]
    pub kind: RelationKind,
}

impl RelationConfig {
    fn to_product(&self) -> Product {
        Product::relation(self.dialect, self.schema.as_deref(), &self.name, self.kind)
    }

    fn member_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

impl TaskConfig {
    /// Declared products.
    ///
    /// A lone `product` or a lone un-keyed relation is a single product;
    /// anything else becomes a metaproduct (a lone `product` combined with
    /// relations is stored under the key `product`).
    /// Metaproduct keys in declaration order, repeats included.
    pub(crate) fn member_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        if self.product.is_some() {
            keys.push("product");
        }
        keys.extend(self.products.iter().flatten().map(|(key, _)| key.as_str()));
        keys.extend(self.relations.iter().map(RelationConfig::member_key));
        keys
    }

    pub fn to_products(&self) -> Products {
        match (&self.product, &self.products, self.relations.as_slice()) {
            (Some(p), None, []) => Products::Single(Product::file(p)),
            (None, None, [rel]) if rel.key.is_none() => Products::Single(rel.to_product()),
            _ => {
                let mut members = BTreeMap::new();
                if let Some(p) = &self.product {
                    members.insert("product".to_string(), Product::file(p));
                }
                for (key, p) in self.products.iter().flatten() {
                    members.insert(key.clone(), Product::file(p));
                }
                for rel in &self.relations {
                    members.insert(rel.member_key().to_string(), rel.to_product());
                }
                Products::Meta(members)
            }
        }
    }

    pub fn to_task(&self) -> Task {
        let mut task = Task::new(self.name.clone(), self.cmd.clone()).with_products(self.to_products());
        for up in &self.upstream {
            task.add_upstream(up.clone());
        }
        for (key, value) in &self.params {
            let rendered = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            task = task.with_param(key.clone(), rendered);
        }
        task
    }
}
