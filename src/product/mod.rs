// src/product/mod.rs

//! Product handles: the artifacts a task promises to create.
//!
//! - [`Product`] is a tagged variant over files and database relations.
//! - [`ProductId`] is the normalized identity used by the uniqueness check
//!   at render time.
//! - [`Products`] is what a task declares: a single product or a named
//!   metaproduct.
//! - [`backend`] answers "does this product exist?" for the staleness
//!   resolver.

pub mod backend;
pub mod path;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use backend::{MemoryRelationClient, ProductBackends, RelationClient};

/// SQL dialect a relation lives in.
///
/// The dialect selects which [`RelationClient`] answers existence queries;
/// it does not take part in the product's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationDialect {
    Sql,
    Postgres,
    Sqlite,
    GenericSql,
}

impl RelationDialect {
    fn class_name(self) -> &'static str {
        match self {
            RelationDialect::Sql => "SQLRelation",
            RelationDialect::Postgres => "PostgresRelation",
            RelationDialect::Sqlite => "SQLiteRelation",
            RelationDialect::GenericSql => "GenericSQLRelation",
        }
    }
}

impl fmt::Display for RelationDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    #[default]
    Table,
    View,
}

impl RelationKind {
    fn as_str(self) -> &'static str {
        match self {
            RelationKind::Table => "table",
            RelationKind::View => "view",
        }
    }
}

/// A table or view in some database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub dialect: RelationDialect,
    pub schema: Option<String>,
    pub name: String,
    pub kind: RelationKind,
}

/// Handle to a concrete artifact produced by a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Product {
    /// A file, as declared (possibly relative to the DAG root).
    File(PathBuf),
    Relation(Relation),
}

impl Product {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Product::File(path.into())
    }

    pub fn relation(
        dialect: RelationDialect,
        schema: Option<&str>,
        name: &str,
        kind: RelationKind,
    ) -> Self {
        Product::Relation(Relation {
            dialect,
            schema: schema.map(str::to_string),
            name: name.to_string(),
            kind,
        })
    }

    /// Normalized identity of this product.
    ///
    /// Files compare by their absolute, lexically normalized path (relative
    /// paths are resolved against `root`). Relations compare by schema and
    /// name only, so a Postgres view and a generic SQL table with the same
    /// schema and name are the same product.
    pub fn identity(&self, root: &Path) -> ProductId {
        match self {
            Product::File(p) => ProductId::File(path::absolutize(root, p)),
            Product::Relation(r) => ProductId::Relation {
                schema: r.schema.clone(),
                name: r.name.clone(),
            },
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::File(p) => write!(f, "File('{}')", p.display()),
            Product::Relation(r) => {
                write!(f, "{}((", r.dialect)?;
                if let Some(schema) = &r.schema {
                    write!(f, "'{schema}', ")?;
                }
                write!(f, "'{}', '{}'))", r.name, r.kind.as_str())
            }
        }
    }
}

/// Identity under which products are compared for uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProductId {
    File(PathBuf),
    Relation { schema: Option<String>, name: String },
}

/// The products a task declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Products {
    Single(Product),
    /// Named sub-products; each member is checked for uniqueness on its own.
    Meta(BTreeMap<String, Product>),
}

impl Products {
    /// A metaproduct with no members, for tasks that produce nothing
    /// trackable.
    pub fn none() -> Self {
        Products::Meta(BTreeMap::new())
    }

    pub fn meta<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Product)>,
    {
        Products::Meta(members.into_iter().map(|(k, p)| (k.into(), p)).collect())
    }

    /// Flattened view over every declared product.
    pub fn iter(&self) -> impl Iterator<Item = &Product> + '_ {
        let (single, meta) = match self {
            Products::Single(p) => (Some(p), None),
            Products::Meta(m) => (None, Some(m.values())),
        };
        single.into_iter().chain(meta.into_iter().flatten())
    }

    /// Named member of a metaproduct.
    pub fn get(&self, key: &str) -> Option<&Product> {
        match self {
            Products::Single(_) => None,
            Products::Meta(m) => m.get(key),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl From<Product> for Products {
    fn from(p: Product) -> Self {
        Products::Single(p)
    }
}
