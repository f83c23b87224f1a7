// src/dag/render.rs

//! Graph validation and ordering.
//!
//! Rendering runs every check eagerly and collects all violations into a
//! single [`RenderError`], so a broken pipeline is reported in one go and
//! before any runner, store or database is touched.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info};

use crate::dag::task::{Task, TaskId};
use crate::dag::TaskName;
use crate::product::{Product, ProductBackends, ProductId, RelationDialect};

/// A validated graph: topological order plus adjacency as index lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedGraph {
    order: Vec<TaskId>,
    upstream: Vec<Vec<TaskId>>,
    downstream: Vec<Vec<TaskId>>,
}

impl RenderedGraph {
    /// Every task, each one after all of its upstream tasks. Independent
    /// tasks keep their declaration order.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// Direct upstream tasks of `id`, in the order they were declared.
    pub fn upstream_of(&self, id: TaskId) -> &[TaskId] {
        &self.upstream[id.0]
    }

    /// Direct downstream tasks of `id`, in declaration order.
    pub fn downstream_of(&self, id: TaskId) -> &[TaskId] {
        &self.downstream[id.0]
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One product claimed by more than one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateProduct {
    /// The product as first declared, e.g. `File('a')`.
    pub product: String,
    pub identity: ProductId,
    /// Owning tasks in declaration order.
    pub tasks: Vec<TaskName>,
}

/// A single reason a graph failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderViolation {
    /// Every product collision found, in order of first declaration.
    DuplicateProducts(Vec<DuplicateProduct>),
    UnknownUpstream { task: TaskName, upstream: TaskName },
    /// A relation product whose dialect has no client configured.
    MissingClient {
        task: TaskName,
        product: String,
        dialect: RelationDialect,
    },
    /// Witness cycle; the first task is repeated at the end.
    Cycle(Vec<TaskName>),
}

impl fmt::Display for RenderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderViolation::DuplicateProducts(dups) => {
                write!(
                    f,
                    "Tasks must generate unique Products. \
                     The following Products appear in more than one task {{"
                )?;
                for (i, dup) in dups.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let names: Vec<String> = dup.tasks.iter().map(|t| format!("'{t}'")).collect();
                    write!(f, "{}: [{}]", dup.product, names.join(", "))?;
                }
                write!(f, "}}")
            }
            RenderViolation::UnknownUpstream { task, upstream } => {
                write!(f, "task '{task}' declares unknown upstream '{upstream}'")
            }
            RenderViolation::MissingClient {
                task,
                product,
                dialect,
            } => write!(
                f,
                "task '{task}' declares {product} but no {dialect} client is configured"
            ),
            RenderViolation::Cycle(path) => {
                write!(f, "cycle detected in task DAG: {}", path.join(" -> "))
            }
        }
    }
}

/// Aggregated render failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    violations: Vec<RenderViolation>,
}

impl RenderError {
    pub fn violations(&self) -> &[RenderViolation] {
        &self.violations
    }

    pub fn duplicates(&self) -> Option<&[DuplicateProduct]> {
        self.violations.iter().find_map(|v| match v {
            RenderViolation::DuplicateProducts(d) => Some(d.as_slice()),
            _ => None,
        })
    }

    pub fn cycle(&self) -> Option<&[TaskName]> {
        self.violations.iter().find_map(|v| match v {
            RenderViolation::Cycle(c) => Some(c.as_slice()),
            _ => None,
        })
    }
}

impl std::error::Error for RenderError {}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Validate `tasks` and order them topologically.
pub(crate) fn render(
    tasks: &[Task],
    index: &HashMap<TaskName, TaskId>,
    backends: &ProductBackends,
) -> Result<RenderedGraph, RenderError> {
    let mut violations = Vec::new();

    let dups = duplicate_products(tasks, backends);
    if !dups.is_empty() {
        violations.push(RenderViolation::DuplicateProducts(dups));
    }
    violations.extend(missing_clients(tasks, backends));

    let (upstream, unresolved) = resolve_upstream(tasks, index);
    violations.extend(unresolved);

    let mut downstream: Vec<Vec<TaskId>> = vec![Vec::new(); tasks.len()];
    for (i, ups) in upstream.iter().enumerate() {
        for up in ups {
            downstream[up.0].push(TaskId(i));
        }
    }

    match topological_order(&upstream, &downstream) {
        Some(order) if violations.is_empty() => {
            info!(tasks = order.len(), "rendered DAG");
            Ok(RenderedGraph {
                order,
                upstream,
                downstream,
            })
        }
        Some(_) => Err(RenderError { violations }),
        None => {
            for cycle in witness_cycles(&downstream) {
                let names = cycle.iter().map(|id| tasks[id.0].name().to_string()).collect();
                violations.push(RenderViolation::Cycle(names));
            }
            Err(RenderError { violations })
        }
    }
}

/// Map every normalized product identity to its owners and keep the ones
/// owned by more than one task.
fn duplicate_products(tasks: &[Task], backends: &ProductBackends) -> Vec<DuplicateProduct> {
    let mut first_seen: Vec<ProductId> = Vec::new();
    let mut owners: HashMap<ProductId, (&Product, Vec<TaskName>)> = HashMap::new();

    for task in tasks {
        for product in task.products() {
            let id = backends.identity(product);
            let entry = owners.entry(id.clone()).or_insert_with(|| {
                first_seen.push(id);
                (product, Vec::new())
            });
            if !entry.1.iter().any(|t| t == task.name()) {
                entry.1.push(task.name().to_string());
            }
        }
    }

    first_seen
        .into_iter()
        .filter_map(|id| {
            let (product, names) = owners.remove(&id)?;
            (names.len() > 1).then(|| {
                debug!(%product, tasks = ?names, "duplicate product");
                DuplicateProduct {
                    product: product.to_string(),
                    identity: id,
                    tasks: names,
                }
            })
        })
        .collect()
}

fn missing_clients(tasks: &[Task], backends: &ProductBackends) -> Vec<RenderViolation> {
    let mut out = Vec::new();
    for task in tasks {
        for product in task.products() {
            if let Product::Relation(rel) = product {
                if !backends.has_client(rel.dialect) {
                    out.push(RenderViolation::MissingClient {
                        task: task.name().to_string(),
                        product: product.to_string(),
                        dialect: rel.dialect,
                    });
                }
            }
        }
    }
    out
}

/// Translate upstream names into ids, collecting the ones that do not
/// resolve. Unresolved edges are left out of the adjacency lists.
fn resolve_upstream(
    tasks: &[Task],
    index: &HashMap<TaskName, TaskId>,
) -> (Vec<Vec<TaskId>>, Vec<RenderViolation>) {
    let mut upstream = Vec::with_capacity(tasks.len());
    let mut unresolved = Vec::new();

    for task in tasks {
        let mut ids = Vec::with_capacity(task.upstream().len());
        for name in task.upstream() {
            match index.get(name) {
                Some(id) => ids.push(*id),
                None => unresolved.push(RenderViolation::UnknownUpstream {
                    task: task.name().to_string(),
                    upstream: name.clone(),
                }),
            }
        }
        upstream.push(ids);
    }

    (upstream, unresolved)
}

/// Kahn's algorithm, always taking the ready task with the smallest
/// declaration index. `None` if any task cannot be ordered.
fn topological_order(upstream: &[Vec<TaskId>], downstream: &[Vec<TaskId>]) -> Option<Vec<TaskId>> {
    let mut remaining: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(upstream.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(TaskId(i));
        for d in &downstream[i] {
            remaining[d.0] -= 1;
            if remaining[d.0] == 0 {
                ready.push(Reverse(d.0));
            }
        }
    }

    (order.len() == upstream.len()).then_some(order)
}

/// One witness cycle per non-trivial strongly connected component.
fn witness_cycles(downstream: &[Vec<TaskId>]) -> Vec<Vec<TaskId>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(downstream.len(), 0);
    let nodes: Vec<NodeIndex> = (0..downstream.len()).map(|i| graph.add_node(i)).collect();
    for (i, ds) in downstream.iter().enumerate() {
        for d in ds {
            graph.add_edge(nodes[i], nodes[d.0], ());
        }
    }

    let mut cycles: Vec<Vec<TaskId>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let members: HashSet<usize> = scc.iter().map(|n| graph[*n]).collect();
            walk_cycle(downstream, &members)
        })
        .collect();
    cycles.sort();
    cycles
}

/// Follow edges inside one strongly connected component until a task
/// repeats; the repeated stretch is a cycle.
fn walk_cycle(downstream: &[Vec<TaskId>], members: &HashSet<usize>) -> Vec<TaskId> {
    let start = members.iter().copied().min().unwrap_or_default();
    let mut path = vec![TaskId(start)];
    let mut seen_at: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        let Some(next) = downstream[current].iter().find(|d| members.contains(&d.0)) else {
            return path;
        };
        if let Some(&pos) = seen_at.get(&next.0) {
            let mut cycle = path.split_off(pos);
            cycle.push(*next);
            return cycle;
        }
        seen_at.insert(next.0, path.len());
        path.push(*next);
        current = next.0;
    }
}
