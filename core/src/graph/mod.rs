//! Task Dependency Graph
//!
//! Tasks are unique by name within one graph. An edge `B -> A` means task `B`
//! depends on task `A`; its [`EdgeKind`] says how. [`GraphBuilder::build`]
//! rejects cycles, so every built graph has a topological order.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::IdGenerator;


/* ===================== Errors ===================== */

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("task '{name}' is declared twice with different definitions")]
    DuplicateTask { name: String },

    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<String> },

    #[error("unknown task '{name}'")]
    UnknownTask { name: String },

    #[error("'{dependent} -> {dependency}' is declared as both {existing} and {requested}")]
    ConflictingEdge {
        dependent: String,
        dependency: String,
        existing: EdgeKind,
        requested: EdgeKind,
    },
}

fn format_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

/* ===================== Edge Kinds ===================== */

/// How a dependent task relates to its dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Plain ordering; used when a statement names no kind and for `depends_on`
    #[default]
    Sequence,
    SequenceAnd,
    SequenceOr,
    SubtaskMandatory,
    SubtaskOptional,
    ConditionalCorrect,
    ConditionalFalse,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 7] = [
        EdgeKind::Sequence,
        EdgeKind::SequenceAnd,
        EdgeKind::SequenceOr,
        EdgeKind::SubtaskMandatory,
        EdgeKind::SubtaskOptional,
        EdgeKind::ConditionalCorrect,
        EdgeKind::ConditionalFalse,
    ];

    /// Short attribute spelling, as in `[type=st_m]`
    pub fn short_name(self) -> &'static str {
        match self {
            EdgeKind::Sequence => "seq",
            EdgeKind::SequenceAnd => "seq_and",
            EdgeKind::SequenceOr => "seq_or",
            EdgeKind::SubtaskMandatory => "st_m",
            EdgeKind::SubtaskOptional => "st_o",
            EdgeKind::ConditionalCorrect => "c_c",
            EdgeKind::ConditionalFalse => "c_f",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            EdgeKind::Sequence => "sequence",
            EdgeKind::SequenceAnd => "sequence_and",
            EdgeKind::SequenceOr => "sequence_or",
            EdgeKind::SubtaskMandatory => "subtask_mandatory",
            EdgeKind::SubtaskOptional => "subtask_optional",
            EdgeKind::ConditionalCorrect => "conditional_correct",
            EdgeKind::ConditionalFalse => "conditional_false",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.long_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown edge type '{0}'")]
pub struct UnknownEdgeKind(pub String);

impl FromStr for EdgeKind {
    type Err = UnknownEdgeKind;

    /// Accepts both the short and the long spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeKind::ALL
            .into_iter()
            .find(|kind| kind.short_name() == s || kind.long_name() == s)
            .ok_or_else(|| UnknownEdgeKind(s.to_string()))
    }
}

/* ===================== Graph ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Task<P> {
    pub id: u64,
    pub name: String,
    pub payload: P,
}

/// Directed acyclic graph of tasks
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDependencyGraph<P> {
    /// In declaration order
    tasks: Vec<Task<P>>,
    /// First-added first
    edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    dependent: usize,
    dependency: usize,
    kind: EdgeKind,
}

impl<P> TaskDependencyGraph<P> {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task<P>] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Task<P>> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// `(dependent, dependency, kind)` in the order they were added
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, EdgeKind)> {
        self.edges.iter().map(|edge| {
            (
                self.tasks[edge.dependent].name.as_str(),
                self.tasks[edge.dependency].name.as_str(),
                edge.kind,
            )
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, dependent: &str, dependency: &str) -> bool {
        self.edge_kind(dependent, dependency).is_some()
    }

    pub fn edge_kind(&self, dependent: &str, dependency: &str) -> Option<EdgeKind> {
        self.edges()
            .find(|&(from, to, _)| from == dependent && to == dependency)
            .map(|(_, _, kind)| kind)
    }

    /// Direct dependencies of `name`
    pub fn dependencies(&self, name: &str) -> Vec<&Task<P>> {
        self.edges
            .iter()
            .filter(|edge| self.tasks[edge.dependent].name == name)
            .map(|edge| &self.tasks[edge.dependency])
            .collect()
    }

    /// Dependencies before dependents; ties go to the earlier-declared task
    pub fn topological_order(&self) -> Vec<&Task<P>> {
        let mut pending: Vec<usize> = vec![0; self.tasks.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        for edge in &self.edges {
            pending[edge.dependent] += 1;
            dependents[edge.dependency].push(edge.dependent);
        }

        let mut ready: BTreeSet<usize> = (0..self.tasks.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(next) = ready.pop_first() {
            order.push(&self.tasks[next]);
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order
    }

    /// Same structure with each payload replaced; stops at the first error
    pub fn try_map_payloads<Q, E>(
        self,
        mut f: impl FnMut(&str, P) -> Result<Q, E>,
    ) -> Result<TaskDependencyGraph<Q>, E> {
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let payload = f(&task.name, task.payload)?;
            tasks.push(Task {
                id: task.id,
                name: task.name,
                payload,
            });
        }
        Ok(TaskDependencyGraph {
            tasks,
            edges: self.edges,
        })
    }
}

impl<P> fmt::Display for TaskDependencyGraph<P> {
    /// Dot-style listing: one line per edge, isolated tasks on their own
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, task) in self.tasks.iter().enumerate() {
            let linked = self
                .edges
                .iter()
                .any(|edge| edge.dependent == index || edge.dependency == index);
            if !linked {
                writeln!(f, "{}", task.name)?;
            }
        }
        for (from, to, kind) in self.edges() {
            match kind {
                EdgeKind::Sequence => writeln!(f, "{} -> {}", from, to)?,
                kind => writeln!(f, "{} -> {} [type={}]", from, to, kind.short_name())?,
            }
        }
        Ok(())
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Clone)]
pub struct GraphBuilder<P> {
    tasks: Vec<(String, P)>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl<P> Default for GraphBuilder<P> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
        }
    }
}

impl<P: PartialEq> GraphBuilder<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Add a task. Re-adding the same name with an equal payload is a no-op;
    /// with a different payload it is [`GraphError::DuplicateTask`].
    pub fn add_task(&mut self, name: impl Into<String>, payload: P) -> Result<(), GraphError> {
        let name = name.into();
        if let Some(&existing) = self.index.get(&name) {
            if self.tasks[existing].1 == payload {
                return Ok(());
            }
            return Err(GraphError::DuplicateTask { name });
        }
        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push((name, payload));
        Ok(())
    }

    /// `dependent` depends on `dependency` by a [`EdgeKind::Sequence`] edge
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<(), GraphError> {
        self.add_edge(dependent, dependency, EdgeKind::default())
    }

    /// Both tasks must already exist. Repeating an edge with the same kind is
    /// a no-op; with another kind it is [`GraphError::ConflictingEdge`].
    pub fn add_edge(&mut self, dependent: &str, dependency: &str, kind: EdgeKind) -> Result<(), GraphError> {
        let from = self.position(dependent)?;
        let to = self.position(dependency)?;
        let existing = self
            .edges
            .iter()
            .find(|edge| edge.dependent == from && edge.dependency == to);
        match existing {
            Some(edge) if edge.kind == kind => Ok(()),
            Some(edge) => Err(GraphError::ConflictingEdge {
                dependent: dependent.to_string(),
                dependency: dependency.to_string(),
                existing: edge.kind,
                requested: kind,
            }),
            None => {
                self.edges.push(Edge {
                    dependent: from,
                    dependency: to,
                    kind,
                });
                Ok(())
            }
        }
    }

    fn position(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask {
                name: name.to_string(),
            })
    }

    /// Check for cycles and assign ids
    pub fn build(self, ids: &IdGenerator) -> Result<TaskDependencyGraph<P>, GraphError> {
        if let Some(cycle) = self.find_cycle() {
            let cycle: Vec<String> = cycle.into_iter().map(|i| self.tasks[i].0.clone()).collect();
            debug!(cycle = ?cycle, "Rejected cyclic task graph");
            return Err(GraphError::CyclicDependency { cycle });
        }

        let tasks: Vec<Task<P>> = self
            .tasks
            .into_iter()
            .map(|(name, payload)| Task {
                id: ids.next_id(),
                name,
                payload,
            })
            .collect();
        debug!(tasks = tasks.len(), edges = self.edges.len(), "Built task graph");

        Ok(TaskDependencyGraph {
            tasks,
            edges: self.edges,
        })
    }

    /// Depth-first search with a recursion stack. Returns the first cycle
    /// found, members in traversal order.
    fn find_cycle(&self) -> Option<Vec<usize>> {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        for edge in &self.edges {
            adjacency[edge.dependent].push(edge.dependency);
        }

        let mut state = vec![Visit::New; self.tasks.len()];
        let mut stack = Vec::new();
        for start in 0..self.tasks.len() {
            if state[start] == Visit::New {
                if let Some(cycle) = visit(start, &adjacency, &mut state, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnStack,
    Done,
}

fn visit(node: usize, adjacency: &[Vec<usize>], state: &mut [Visit], stack: &mut Vec<usize>) -> Option<Vec<usize>> {
    state[node] = Visit::OnStack;
    stack.push(node);

    for &next in &adjacency[node] {
        match state[next] {
            Visit::OnStack => {
                let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                return Some(stack[start..].to_vec());
            }
            Visit::New => {
                if let Some(cycle) = visit(next, adjacency, state, stack) {
                    return Some(cycle);
                }
            }
            Visit::Done => {}
        }
    }

    stack.pop();
    state[node] = Visit::Done;
    None
}
