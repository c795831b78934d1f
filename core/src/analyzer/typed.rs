//! Typed tree produced by the analyzer and consumed by the interpreter.
//!
//! Every name is already resolved: locals versus entry points, aggregate
//! member positions versus extension bindings, built-in versus extension
//! methods. The interpreter never looks at source names to decide what to do.

use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::Location;
use crate::graph::EdgeKind;
use crate::types::DslType;

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedKind,
    pub ty: DslType,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Set,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedKind {
    Literal(Literal),
    /// `let` binding in an enclosing body
    Local(String),
    /// Another top-level definition
    EntryRef(String),
    Collection {
        kind: CollectionKind,
        elements: Vec<TypedExpr>,
    },
    Map(Vec<(TypedExpr, TypedExpr)>),
    Construct(Construction),
    Member {
        object: Box<TypedExpr>,
        member: MemberRef,
    },
    EnumVariant {
        type_name: String,
        variant: String,
    },
    Call {
        function: String,
        args: Vec<TypedExpr>,
    },
    MethodCall {
        receiver: Box<TypedExpr>,
        method: Method,
        args: Vec<TypedExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    /// Aggregate member at `index` in declared order
    Field { index: usize, name: String },
    Extension { host_name: String, name: String },
}

impl MemberRef {
    pub fn name(&self) -> &str {
        match self {
            MemberRef::Field { name, .. } | MemberRef::Extension { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Size,
    Contains,
    Get,
    Extension(String),
}

/// Aggregate construction with its arguments resolved to member positions
#[derive(Debug, Clone, PartialEq)]
pub struct Construction {
    pub type_name: String,
    /// In source order
    pub items: Vec<ConstructItem>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstructItem {
    /// Binds `name` for the items that follow
    Let { name: String, value: TypedExpr },
    /// Value for the member at `index`
    Arg { index: usize, value: TypedExpr },
    /// Extension property write, applied after construction
    Write {
        name: String,
        value: TypedExpr,
        location: Location,
    },
}

/// Reference to a task entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionBody {
    Object {
        construction: Construction,
        /// `depends_on` of a task definition
        dependencies: Vec<TaskRef>,
    },
    Graph { statements: Vec<TaskChain> },
}

/// One graph statement: every task of a group depends on every task of the
/// next group
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChain {
    pub groups: Vec<Vec<TaskRef>>,
    pub kind: EdgeKind,
}

impl TaskChain {
    /// `(dependent, dependency)` pairs, group by group
    pub fn links(&self) -> impl Iterator<Item = (&TaskRef, &TaskRef)> {
        self.groups.windows(2).flat_map(|pair| {
            let (dependents, dependencies) = (&pair[0], &pair[1]);
            dependents
                .iter()
                .flat_map(move |from| dependencies.iter().map(move |to| (from, to)))
        })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskRef> {
        self.groups.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedDefinition {
    pub name: String,
    pub location: Location,
    pub ty: DslType,
    pub body: DefinitionBody,
}

impl AnalyzedDefinition {
    pub fn dependencies(&self) -> &[TaskRef] {
        match &self.body {
            DefinitionBody::Object { dependencies, .. } => dependencies,
            DefinitionBody::Graph { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedFile {
    pub path: PathBuf,
    pub file: Arc<str>,
    pub definitions: Vec<AnalyzedDefinition>,
}

impl AnalyzedFile {
    pub fn definition(&self, name: &str) -> Option<&AnalyzedDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}
