//! Abstract Syntax Tree node types
//!
//! The tree is a closed set of tagged unions. Every node carries the [`Span`]
//! it was parsed from so later passes can report errors against the source.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::EdgeKind;

/// Source location span for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Start line (0-indexed)
    pub start_line: usize,
    /// Start column (0-indexed)
    pub start_col: usize,
    /// End line (0-indexed)
    pub end_line: usize,
    /// End column (0-indexed)
    pub end_col: usize,
}

impl Span {
    pub fn new(
        start: usize,
        end: usize,
        start_line: usize,
        start_col: usize,
        end_line: usize,
        end_col: usize,
    ) -> Self {
        Self {
            start,
            end,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span that covers both self and other
    pub fn merge(&self, other: &Span) -> Span {
        let (start, start_line, start_col) = if self.start <= other.start {
            (self.start, self.start_line, self.start_col)
        } else {
            (other.start, other.start_line, other.start_col)
        };
        let (end, end_line, end_col) = if self.end >= other.end {
            (self.end, self.end_line, self.end_col)
        } else {
            (other.end, other.end_line, other.end_col)
        };
        Span::new(start, end, start_line, start_col, end_line, end_col)
    }
}

fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/// A span inside a particular source file.
///
/// Rendered as `file:line:col` with 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub span: Span,
}

impl Location {
    pub fn new(file: Arc<str>, span: Span) -> Self {
        Self { file, span }
    }

    pub fn line(&self) -> usize {
        self.span.start_line + 1
    }

    pub fn column(&self) -> usize {
        self.span.start_col + 1
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line(), self.column())
    }
}

/* ===================== Program Structure ===================== */

/// A name together with where it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Root node of one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub definitions: Vec<Definition>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// One parsed source file, as handed to the entry point registry
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub document: Document,
}

impl ParsedFile {
    pub fn new(path: impl Into<PathBuf>, document: Document) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    /// The file name used in locations
    pub fn file_name(&self) -> Arc<str> {
        Arc::from(self.path.display().to_string())
    }
}

/// Top-level definition; each one becomes an entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Definition {
    /// `type_name name { items }`
    Object(ObjectDef),
    /// `graph name { A -> B; C, D -> E [type=seq_or] }`
    Graph(GraphDef),
}

impl Definition {
    pub fn name(&self) -> &Ident {
        match self {
            Definition::Object(def) => &def.name,
            Definition::Graph(def) => &def.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Definition::Object(def) => def.span,
            Definition::Graph(def) => def.span,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDef {
    pub type_name: Ident,
    pub name: Ident,
    pub body: Vec<BodyItem>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDef {
    pub name: Ident,
    pub statements: Vec<GraphStmt>,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// `A -> B, C -> D [type=st_m]` or a lone `A`. Every task of a group depends
/// on every task of the next group, by edges of `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStmt {
    pub groups: Vec<Vec<Ident>>,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

/// Item inside an object body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum BodyItem {
    /// `let name = value`
    Let {
        name: Ident,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `name: value`
    Named {
        name: Ident,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// bare `value`, matched by position
    Positional {
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl BodyItem {
    pub fn span(&self) -> Span {
        match self {
            BodyItem::Let { span, .. }
            | BodyItem::Named { span, .. }
            | BodyItem::Positional { span, .. } => *span,
        }
    }
}

/* ===================== Expressions ===================== */

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitInt {
        v: i64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitFloat {
        v: f64,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitBool {
        v: bool,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    LitStr {
        v: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `[a, b]`; list or set depending on the expected type
    List {
        elements: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `[k -> v, ...]`
    Map {
        entries: Vec<(Expr, Expr)>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `type_name { items }`
    Construct {
        type_name: Ident,
        body: Vec<BodyItem>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `object.member`
    Member {
        object: Box<Expr>,
        member: Ident,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `callee(args)`
    Call {
        callee: Ident,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
    /// `receiver.method(args)`
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "is_default_span")]
        span: Span,
    },
}

impl Expr {
    /// Get the span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::LitInt { span, .. }
            | Expr::LitFloat { span, .. }
            | Expr::LitBool { span, .. }
            | Expr::LitStr { span, .. }
            | Expr::Ident { span, .. }
            | Expr::List { span, .. }
            | Expr::Map { span, .. }
            | Expr::Construct { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::MethodCall { span, .. } => *span,
        }
    }
}
