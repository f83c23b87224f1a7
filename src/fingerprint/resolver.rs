// src/fingerprint/resolver.rs

//! Staleness classification.
//!
//! Walks the rendered graph in topological order, computing each task's
//! fingerprint exactly once from its definition and its upstream
//! fingerprints, then compares against the stored record. Reads the store
//! and the product backends; never executes anything.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Context;
use tracing::{debug, warn};

use crate::dag::{Dag, RenderedGraph, TaskId, TaskName};
use crate::errors::{DagError, Result};
use crate::fingerprint::hash::{definition_fingerprint, task_fingerprint};
use crate::fingerprint::store::{FingerprintRecord, FingerprintStore};
use crate::types::StoreErrorPolicy;

/// Why a task has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// No record of a previous successful run.
    NeverRun,
    /// The task's own source or parameters changed.
    DefinitionChanged,
    /// These direct upstream tasks have different fingerprints than the
    /// ones recorded (or were added/removed as upstreams).
    UpstreamChanged(Vec<TaskName>),
    /// These direct upstream tasks are stale and will run first.
    UpstreamStale(Vec<TaskName>),
    /// A declared product does not exist in its backing store.
    ProductMissing(String),
    /// The build was run with `force`.
    Forced,
    /// The record could not be read and the store error policy is
    /// `AssumeStale`.
    StoreUnavailable(String),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NeverRun => write!(f, "never run"),
            StaleReason::DefinitionChanged => write!(f, "definition changed"),
            StaleReason::UpstreamChanged(names) => write!(f, "upstream changed: {}", names.join(", ")),
            StaleReason::UpstreamStale(names) => write!(f, "upstream outdated: {}", names.join(", ")),
            StaleReason::ProductMissing(p) => write!(f, "missing product {p}"),
            StaleReason::Forced => write!(f, "forced"),
            StaleReason::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    Stale(StaleReason),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::UpToDate => write!(f, "up to date"),
            Staleness::Stale(reason) => write!(f, "outdated ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Classify every task as stale regardless of stored records.
    pub force: bool,
    pub on_store_error: StoreErrorPolicy,
}

/// Computed fingerprints of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFingerprint {
    pub definition: String,
    pub upstream: BTreeMap<TaskName, String>,
    pub fingerprint: String,
}

/// Per-task fingerprints and classification, indexed by [`TaskId`].
#[derive(Debug, Clone)]
pub struct Resolution {
    names: Vec<TaskName>,
    fingerprints: Vec<TaskFingerprint>,
    staleness: Vec<Staleness>,
}

impl Resolution {
    pub fn staleness(&self, id: TaskId) -> &Staleness {
        &self.staleness[id.index()]
    }

    pub fn fingerprint(&self, id: TaskId) -> &TaskFingerprint {
        &self.fingerprints[id.index()]
    }

    pub fn is_stale(&self, id: TaskId) -> bool {
        self.staleness[id.index()].is_stale()
    }

    pub fn stale_count(&self) -> usize {
        self.staleness.iter().filter(|s| s.is_stale()).count()
    }

    /// Record to persist after `id` executes successfully.
    pub fn record_for(&self, id: TaskId) -> FingerprintRecord {
        let fp = &self.fingerprints[id.index()];
        FingerprintRecord::success(
            self.names[id.index()].clone(),
            fp.definition.clone(),
            fp.upstream.clone(),
            fp.fingerprint.clone(),
        )
    }
}

/// Classify every task of a rendered DAG.
///
/// Store read failures are fatal unless `options.on_store_error` is
/// `AssumeStale`.
pub fn resolve(
    dag: &Dag,
    graph: &RenderedGraph,
    store: &dyn FingerprintStore,
    options: ResolveOptions,
) -> Result<Resolution> {
    let n = dag.len();
    let mut fingerprints: Vec<Option<TaskFingerprint>> = vec![None; n];
    let mut staleness: Vec<Option<Staleness>> = vec![None; n];

    for &id in graph.order() {
        let task = dag.task(id);

        let mut upstream = BTreeMap::new();
        let mut stale_upstream = Vec::new();
        for &up in graph.upstream_of(id) {
            let name = dag.task(up).name().to_string();
            // Topological order guarantees upstreams were resolved already.
            if let Some(fp) = &fingerprints[up.index()] {
                upstream.insert(name.clone(), fp.fingerprint.clone());
            }
            if staleness[up.index()].as_ref().is_some_and(Staleness::is_stale) {
                stale_upstream.push(name);
            }
        }

        let definition = definition_fingerprint(task.source(), task.params());
        let fingerprint = task_fingerprint(&definition, &upstream);
        let computed = TaskFingerprint {
            definition,
            upstream,
            fingerprint,
        };

        let class = classify(dag, id, &computed, stale_upstream, store, options)?;
        match &class {
            Staleness::UpToDate => debug!(task = %task.name(), "up to date"),
            Staleness::Stale(reason) => debug!(task = %task.name(), %reason, "outdated"),
        }

        fingerprints[id.index()] = Some(computed);
        staleness[id.index()] = Some(class);
    }

    Ok(Resolution {
        names: dag.tasks().map(|t| t.name().to_string()).collect(),
        fingerprints: fingerprints.into_iter().flatten().collect(),
        staleness: staleness.into_iter().flatten().collect(),
    })
}

fn classify(
    dag: &Dag,
    id: TaskId,
    computed: &TaskFingerprint,
    stale_upstream: Vec<TaskName>,
    store: &dyn FingerprintStore,
    options: ResolveOptions,
) -> Result<Staleness> {
    let task = dag.task(id);

    if options.force {
        return Ok(Staleness::Stale(StaleReason::Forced));
    }

    let record = match store.get(task.name()) {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(Staleness::Stale(StaleReason::NeverRun)),
        Err(err) => match options.on_store_error {
            StoreErrorPolicy::Fail => return Err(DagError::Store(err)),
            StoreErrorPolicy::AssumeStale => {
                warn!(task = %task.name(), error = %err, "cannot read fingerprint; assuming outdated");
                return Ok(Staleness::Stale(StaleReason::StoreUnavailable(err.to_string())));
            }
        },
    };

    if record.definition_fingerprint != computed.definition {
        return Ok(Staleness::Stale(StaleReason::DefinitionChanged));
    }

    if record.fingerprint != computed.fingerprint {
        let mut changed: Vec<TaskName> = computed
            .upstream
            .iter()
            .filter(|(name, fp)| record.upstream_fingerprints.get(*name) != Some(*fp))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            record
                .upstream_fingerprints
                .keys()
                .filter(|name| !computed.upstream.contains_key(*name))
                .cloned(),
        );
        return Ok(Staleness::Stale(StaleReason::UpstreamChanged(changed)));
    }

    if !stale_upstream.is_empty() {
        return Ok(Staleness::Stale(StaleReason::UpstreamStale(stale_upstream)));
    }

    let backends = dag.backends();
    for product in task.products() {
        let exists = backends
            .exists(product)
            .with_context(|| format!("checking product {product} of task '{}'", task.name()))?;
        if !exists {
            return Ok(Staleness::Stale(StaleReason::ProductMissing(product.to_string())));
        }
    }

    Ok(Staleness::UpToDate)
}
