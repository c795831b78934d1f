//! Dungeon configuration language
//!
//! Host applications declare their types in a [`types::Registry`], load
//! source files into a [`program::Program`] and evaluate entry points with an
//! [`interpreter::Interpreter`]. See [`environment`] for the standard bindings.

pub mod analyzer;
pub mod ast;
pub mod cli;
pub mod config;
pub mod entry_points;
pub mod environment;
pub mod error;
pub mod graph;
pub mod ids;
pub mod interpreter;
pub mod parser;
pub mod program;
pub mod symbols;
pub mod types;

// Re-export main types
pub use environment::{standard_declarations, standard_registry, DungeonConfig};
pub use error::{DslError, DslResult};
pub use graph::{EdgeKind, TaskDependencyGraph};
pub use interpreter::{Diagnostic, EvaluationError, Interpreter};
pub use program::{load_sources, Program, SourceFile};
pub use types::{Registry, RegistryBuilder, TypeDecl, TypeRef, Value};
