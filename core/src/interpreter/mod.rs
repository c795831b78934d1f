//! Interpreter
//!
//! Tree-walking evaluation of the typed tree produced by the analyzer.
//! Entry points are evaluated on demand and at most once per interpreter;
//! a reference to another entry point evaluates that one first.
//!
//! Evaluation is fail-fast, with one exception: an adapter that fails yields
//! [`Value::Absent`] and a [`Diagnostic`], and its siblings are still
//! evaluated. Requiring an absent value later is a [`EvaluationError::MissingValue`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::analyzer::{
    AnalyzedDefinition, CollectionKind, ConstructItem, Construction, DefinitionBody, Literal, MemberRef,
    Method, TaskChain, TaskRef, TypedExpr, TypedKind,
};
use crate::ast::Location;
use crate::environment::DungeonConfig;
use crate::graph::{EdgeKind, GraphBuilder, GraphError};
use crate::ids::{entropy_id, IdGenerator};
use crate::program::Program;
use crate::symbols::SymbolTable;
use crate::types::{AggregateType, Arguments, HostError, Instance, Registry, Value};


/* ===================== Errors ===================== */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("unknown entry point '{name}'")]
    UnknownEntryPoint { name: String },

    #[error("{location}: unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String, location: Location },

    /// The entry point exists but its file failed to load
    #[error("{location}: '{name}' is unavailable because {file} failed to load")]
    Unavailable {
        name: String,
        file: String,
        location: Location,
    },

    #[error("{location}: '{name}' is a {type_name}, not a dungeon_config")]
    NotAConfig {
        name: String,
        type_name: String,
        location: Location,
    },

    #[error("{location}: {source}")]
    Host { location: Location, source: HostError },

    #[error("{location}: missing value for '{member}'")]
    MissingValue { member: String, location: Location },

    #[error("{location}: {source}")]
    Graph { location: Location, source: GraphError },

    #[error("{location}: '{name}' depends on its own value ({})", .chain.join(" -> "))]
    RecursiveDefinition {
        name: String,
        chain: Vec<String>,
        location: Location,
    },

    #[error("{location}: {message}")]
    Runtime { message: String, location: Location },
}

impl EvaluationError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            EvaluationError::UnknownEntryPoint { .. } => None,
            EvaluationError::UnresolvedSymbol { location, .. }
            | EvaluationError::Unavailable { location, .. }
            | EvaluationError::NotAConfig { location, .. }
            | EvaluationError::Host { location, .. }
            | EvaluationError::MissingValue { location, .. }
            | EvaluationError::Graph { location, .. }
            | EvaluationError::RecursiveDefinition { location, .. }
            | EvaluationError::Runtime { location, .. } => Some(location),
        }
    }

    fn runtime(message: impl Into<String>, location: &Location) -> Self {
        EvaluationError::Runtime {
            message: message.into(),
            location: location.clone(),
        }
    }
}

pub type EvalResult<T> = Result<T, EvaluationError>;

/* ===================== Diagnostics ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    AdapterFailure,
}

/// Non-fatal problem recorded during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::AdapterFailure => write!(f, "{}: adapter failed: {}", self.location, self.message),
        }
    }
}

/* ===================== Interpreter ===================== */

pub struct Interpreter<'a> {
    registry: &'a Registry,
    program: &'a Program,
    ids: &'a IdGenerator,
    /// `let` bindings of the bodies being evaluated
    scope: SymbolTable<Value>,
    /// Evaluated entry points
    values: HashMap<String, Value>,
    /// Entry points under evaluation, outermost first
    in_progress: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Interpreter<'a> {
    pub fn new(registry: &'a Registry, program: &'a Program, ids: &'a IdGenerator) -> Self {
        Self {
            registry,
            program,
            ids,
            scope: SymbolTable::new(),
            values: HashMap::new(),
            in_progress: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Evaluate the `dungeon_config` entry point `entry` into its host value
    pub fn run(&mut self, entry: &str) -> EvalResult<DungeonConfig> {
        // Correlates the log lines of one run
        let run_id = entropy_id();
        debug!(%run_id, entry, "Interpreting entry point");
        let value = self.evaluate(entry)?;

        let config = value
            .as_object()
            .and_then(|instance| instance.host.downcast_clone::<DungeonConfig>());
        let Some(mut config) = config else {
            let program = self.program;
            let (type_name, location) = match program.entry_points().get(entry) {
                Some(point) => (point.ty.name(), point.location.clone()),
                None => return Err(EvaluationError::UnknownEntryPoint { name: entry.to_string() }),
            };
            return Err(EvaluationError::NotAConfig {
                name: entry.to_string(),
                type_name,
                location,
            });
        };

        if config.display_name.is_empty() {
            config.display_name = entry.to_string();
        }

        info!(
            %run_id,
            entry,
            tasks = config.dependency_graph.len(),
            edges = config.dependency_graph.edge_count(),
            diagnostics = self.diagnostics.len(),
            "Configuration evaluated"
        );
        Ok(config)
    }

    /// Value of the entry point `name`
    pub fn evaluate(&mut self, name: &str) -> EvalResult<Value> {
        let location = self.entry_location(name)?;
        self.evaluate_entry(name, &location)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        mem::take(&mut self.diagnostics)
    }

    fn entry_location(&self, name: &str) -> EvalResult<Location> {
        self.program
            .entry_points()
            .get(name)
            .map(|entry| entry.location.clone())
            .ok_or_else(|| EvaluationError::UnknownEntryPoint { name: name.to_string() })
    }

    /// Analyzed definition for a reference at `location`
    fn definition(&self, name: &str, location: &Location) -> EvalResult<&'a AnalyzedDefinition> {
        let program = self.program;
        if let Some(definition) = program.definition(name) {
            return Ok(definition);
        }
        match program.entry_points().get(name) {
            Some(entry) => Err(EvaluationError::Unavailable {
                name: name.to_string(),
                file: entry.file().to_string(),
                location: location.clone(),
            }),
            None => Err(EvaluationError::UnresolvedSymbol {
                name: name.to_string(),
                location: location.clone(),
            }),
        }
    }

    fn evaluate_entry(&mut self, name: &str, location: &Location) -> EvalResult<Value> {
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            let mut chain = self.in_progress[start..].to_vec();
            chain.push(name.to_string());
            return Err(EvaluationError::RecursiveDefinition {
                name: name.to_string(),
                chain,
                location: location.clone(),
            });
        }

        let definition = self.definition(name, location)?;
        debug!(entry = name, "Evaluating entry point");

        // Each definition body starts from an empty local scope
        let saved = mem::replace(&mut self.scope, SymbolTable::new());
        self.in_progress.push(name.to_string());
        let result = match &definition.body {
            DefinitionBody::Object { construction, .. } => self.construct(construction),
            DefinitionBody::Graph { statements } => self.build_graph(statements, &definition.location),
        };
        self.in_progress.pop();
        self.scope = saved;

        let value = result?;
        self.values.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /* ===================== Graphs ===================== */

    /// Structure first, from the names in `statements` and every `depends_on`
    /// reachable from them; task values only once the structure is acyclic.
    fn build_graph(&mut self, statements: &[TaskChain], location: &Location) -> EvalResult<Value> {
        let mut builder: GraphBuilder<Location> = GraphBuilder::new();
        let mut edges: Vec<(String, String, EdgeKind, Location)> = Vec::new();

        for statement in statements {
            for (dependent, dependency) in statement.links() {
                edges.push((
                    dependent.name.clone(),
                    dependency.name.clone(),
                    statement.kind,
                    dependent.location.clone(),
                ));
            }
        }

        let mut queue: VecDeque<TaskRef> = statements.iter().flat_map(TaskChain::tasks).cloned().collect();
        while let Some(task) = queue.pop_front() {
            if builder.has_task(&task.name) {
                continue;
            }
            let definition = self.definition(&task.name, &task.location)?;
            builder
                .add_task(task.name.clone(), definition.location.clone())
                .map_err(|source| EvaluationError::Graph {
                    location: task.location.clone(),
                    source,
                })?;
            for dependency in definition.dependencies() {
                edges.push((
                    task.name.clone(),
                    dependency.name.clone(),
                    EdgeKind::default(),
                    dependency.location.clone(),
                ));
                queue.push_back(dependency.clone());
            }
        }

        for (dependent, dependency, kind, edge_location) in &edges {
            builder
                .add_edge(dependent, dependency, *kind)
                .map_err(|source| EvaluationError::Graph {
                    location: edge_location.clone(),
                    source,
                })?;
        }

        let structure = builder.build(self.ids).map_err(|source| EvaluationError::Graph {
            location: location.clone(),
            source,
        })?;
        debug!(tasks = structure.len(), edges = structure.edge_count(), "Task graph built");

        let graph = structure.try_map_payloads(|name, task_location| self.evaluate_entry(name, &task_location))?;
        Ok(Value::Graph(Rc::new(graph)))
    }

    /* ===================== Construction ===================== */

    fn aggregate(&self, type_name: &str, location: &Location) -> EvalResult<&'a AggregateType> {
        let registry = self.registry;
        registry
            .aggregate(type_name)
            .ok_or_else(|| EvaluationError::runtime(format!("'{}' is not a constructible type", type_name), location))
    }

    fn construct(&mut self, construction: &Construction) -> EvalResult<Value> {
        let aggregate = self.aggregate(&construction.type_name, &construction.location)?;

        self.scope.push_scope();
        let items = self.evaluate_items(aggregate, &construction.items);
        self.scope.pop_scope();
        let (slots, writes) = items?;

        let args = Arguments::new(
            aggregate
                .members
                .iter()
                .zip(slots)
                .map(|(member, value)| (member.name.clone(), value))
                .collect(),
        );

        let host = match aggregate.build(&args) {
            Ok(host) => host,
            Err(err) if aggregate.is_adapted() => {
                warn!(
                    location = %construction.location,
                    type_name = %aggregate.name,
                    error = %err,
                    "Adapter failed, value is absent"
                );
                self.diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::AdapterFailure,
                    location: construction.location.clone(),
                    message: format!("{}: {}", aggregate.name, err),
                });
                return Ok(Value::Absent);
            }
            Err(HostError::MissingValue { member }) => {
                return Err(EvaluationError::MissingValue {
                    member,
                    location: construction.location.clone(),
                })
            }
            Err(source) => {
                return Err(EvaluationError::Host {
                    location: construction.location.clone(),
                    source,
                })
            }
        };

        let members = args.iter().map(|(name, value)| (name.to_string(), value.clone())).collect();
        let instance = Instance::new(aggregate.name.clone(), host, members);

        for (name, value, location) in writes {
            let property = self
                .registry
                .extension(&aggregate.host_name, &name)
                .ok_or_else(|| EvaluationError::runtime(format!("no property '{}'", name), &location))?;
            property
                .set(&instance.host, value)
                .map_err(|source| EvaluationError::Host { location, source })?;
        }

        Ok(Value::Object(instance))
    }

    /// Member values in declared order plus the property writes to apply
    /// once the object exists
    #[allow(clippy::type_complexity)]
    fn evaluate_items(
        &mut self,
        aggregate: &AggregateType,
        items: &[ConstructItem],
    ) -> EvalResult<(Vec<Value>, Vec<(String, Value, Location)>)> {
        let mut slots = vec![Value::Absent; aggregate.members.len()];
        let mut writes = Vec::new();

        for item in items {
            match item {
                ConstructItem::Let { name, value } => {
                    let evaluated = self.evaluate_expr(value)?;
                    self.scope
                        .declare(name.clone(), evaluated)
                        .map_err(|err| EvaluationError::runtime(err.to_string(), &value.location))?;
                }
                ConstructItem::Arg { index, value } => {
                    let evaluated = self.evaluate_expr(value)?;
                    let slot = slots
                        .get_mut(*index)
                        .ok_or_else(|| EvaluationError::runtime("argument out of range", &value.location))?;
                    *slot = evaluated;
                }
                ConstructItem::Write { name, value, location } => {
                    let evaluated = required(self.evaluate_expr(value)?, name, location)?;
                    writes.push((name.clone(), evaluated, location.clone()));
                }
            }
        }

        Ok((slots, writes))
    }

    /* ===================== Expressions ===================== */

    pub(crate) fn evaluate_expr(&mut self, expr: &TypedExpr) -> EvalResult<Value> {
        match &expr.kind {
            TypedKind::Literal(literal) => Ok(match literal {
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Bool(v) => Value::Bool(*v),
                Literal::Str(v) => Value::Str(v.clone()),
            }),

            TypedKind::Local(name) => self.scope.lookup(name).cloned().ok_or_else(|| {
                EvaluationError::UnresolvedSymbol {
                    name: name.clone(),
                    location: expr.location.clone(),
                }
            }),

            TypedKind::EntryRef(name) => self.evaluate_entry(name, &expr.location),

            TypedKind::Collection { kind, elements } => {
                let values = elements
                    .iter()
                    .map(|element| self.evaluate_expr(element))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(match kind {
                    CollectionKind::List => Value::List(values),
                    CollectionKind::Set => Value::set_from(values),
                })
            }

            TypedKind::Map(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    values.push((self.evaluate_expr(key)?, self.evaluate_expr(value)?));
                }
                Ok(Value::map_from(values))
            }

            TypedKind::Construct(construction) => self.construct(construction),

            TypedKind::Member { object, member } => {
                let value = self.evaluate_expr(object)?;
                self.read_member(value, member, &expr.location)
            }

            TypedKind::EnumVariant { type_name, variant } => Ok(Value::Enum {
                type_name: type_name.clone(),
                variant: variant.clone(),
            }),

            TypedKind::Call { function, args } => {
                let registry = self.registry;
                let callable = registry
                    .function(function)
                    .ok_or_else(|| EvaluationError::UnresolvedSymbol {
                        name: function.clone(),
                        location: expr.location.clone(),
                    })?;
                let args = self.evaluate_args(function, args)?;
                (callable.call)(&args).map_err(|source| EvaluationError::Host {
                    location: expr.location.clone(),
                    source,
                })
            }

            TypedKind::MethodCall { receiver, method, args } => {
                let value = self.evaluate_expr(receiver)?;
                let value = required(value, &receiver_name(receiver), &receiver.location)?;
                let method_name = match method {
                    Method::Size => "size",
                    Method::Contains => "contains",
                    Method::Get => "get",
                    Method::Extension(name) => name.as_str(),
                };
                let args = self.evaluate_args(method_name, args)?;
                self.call_method(value, receiver, method, &args, &expr.location)
            }
        }
    }

    fn evaluate_args(&mut self, callee: &str, args: &[TypedExpr]) -> EvalResult<Vec<Value>> {
        args.iter()
            .enumerate()
            .map(|(position, arg)| {
                let value = self.evaluate_expr(arg)?;
                required(value, &format!("{} argument {}", callee, position + 1), &arg.location)
            })
            .collect()
    }

    fn read_member(&self, value: Value, member: &MemberRef, location: &Location) -> EvalResult<Value> {
        let value = required(value, member.name(), location)?;
        let Value::Object(instance) = value else {
            return Err(EvaluationError::runtime(
                format!("{} has no member '{}'", value.describe(), member.name()),
                location,
            ));
        };

        match member {
            MemberRef::Field { index, name } => instance
                .members
                .get(*index)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvaluationError::runtime(format!("no member '{}'", name), location)),
            MemberRef::Extension { host_name, name } => {
                let property = self
                    .registry
                    .extension(host_name, name)
                    .ok_or_else(|| EvaluationError::runtime(format!("no property '{}'", name), location))?;
                property.get(&instance.host).map_err(|source| EvaluationError::Host {
                    location: location.clone(),
                    source,
                })
            }
        }
    }

    fn call_method(
        &self,
        receiver: Value,
        receiver_expr: &TypedExpr,
        method: &Method,
        args: &[Value],
        location: &Location,
    ) -> EvalResult<Value> {
        let first = || {
            args.first()
                .ok_or_else(|| EvaluationError::runtime("missing method argument", location))
        };

        match (method, &receiver) {
            (Method::Size, Value::List(v) | Value::Set(v)) => Ok(Value::Int(v.len() as i64)),
            (Method::Size, Value::Map(entries)) => Ok(Value::Int(entries.len() as i64)),

            (Method::Contains, Value::List(v) | Value::Set(v)) => Ok(Value::Bool(v.contains(first()?))),
            (Method::Contains, Value::Map(entries)) => {
                let key = first()?;
                Ok(Value::Bool(entries.iter().any(|(k, _)| k == key)))
            }

            (Method::Get, Value::List(v)) => {
                let index = first()?.as_int().unwrap_or(-1);
                usize::try_from(index)
                    .ok()
                    .and_then(|i| v.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        EvaluationError::runtime(
                            format!("index {} is out of range for a list of {}", index, v.len()),
                            location,
                        )
                    })
            }
            (Method::Get, Value::Map(entries)) => {
                let key = first()?;
                entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| EvaluationError::runtime(format!("no entry for key {}", key.describe()), location))
            }

            (Method::Extension(name), Value::Object(instance)) => {
                let extension = self
                    .registry
                    .method(&receiver_expr.ty, name)
                    .ok_or_else(|| EvaluationError::runtime(format!("no method '{}'", name), location))?;
                (extension.call)(&instance.host, args).map_err(|source| EvaluationError::Host {
                    location: location.clone(),
                    source,
                })
            }

            (method, other) => Err(EvaluationError::runtime(
                format!("cannot call {:?} on {}", method, other.describe()),
                location,
            )),
        }
    }
}

/// Fail if `value` is absent
fn required(value: Value, what: &str, location: &Location) -> EvalResult<Value> {
    if value.is_absent() {
        return Err(EvaluationError::MissingValue {
            member: what.to_string(),
            location: location.clone(),
        });
    }
    Ok(value)
}

/// How a receiver is named in a missing value error
fn receiver_name(expr: &TypedExpr) -> String {
    match &expr.kind {
        TypedKind::Local(name) | TypedKind::EntryRef(name) => name.clone(),
        TypedKind::Member { member, .. } => member.name().to_string(),
        _ => "receiver".to_string(),
    }
}
