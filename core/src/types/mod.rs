//! DSL type system
//!
//! Describes host data structures without touching them. Host code declares
//! its types through [`decl`], [`registry::RegistryBuilder`] turns the
//! declarations into an immutable [`Registry`], and the analyzer and
//! interpreter read from it.

pub mod decl;
pub mod registry;
pub mod value;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::Serialize;

pub use decl::{
    Arguments, EnumDecl, ExtensionMethodDecl, ExtensionPropertyDecl, FunctionDecl, HostError,
    MemberDecl, TypeDecl, TypeRef,
};
pub use registry::{
    AggregateType, Builder, EnumType, ExtensionMethod, ExtensionProperty, HostFunction,
    MemberBinding, MemberLookup, Registry, RegistryBuilder, TypeBuildError, TypeDescriptor,
};
pub use value::{HostObject, Instance, TaskGraph, Value};

/* ===================== Type Descriptors ===================== */

/// Coarse classification of a [`DslType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeKind {
    Basic,
    Aggregate,
    AggregateAdapted,
    FunctionType,
    SetType,
    ListType,
    MapType,
    EnumType,
}

/// Host primitive and opaque types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BasicType {
    Int,
    Float,
    Bool,
    String,
    Graph,
    /// Result type of functions that return nothing
    None,
    /// Host type without DSL-visible members of its own; reachable only
    /// through extension bindings
    Opaque(String),
}

impl BasicType {
    pub fn name(&self) -> &str {
        match self {
            BasicType::Int => "int",
            BasicType::Float => "float",
            BasicType::Bool => "bool",
            BasicType::String => "string",
            BasicType::Graph => "graph",
            BasicType::None => "none",
            BasicType::Opaque(name) => name,
        }
    }
}

/// Signature of a host-exposed callable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionType {
    pub params: Vec<DslType>,
    pub ret: DslType,
}

impl FunctionType {
    pub fn new(params: Vec<DslType>, ret: DslType) -> Self {
        Self { params, ret }
    }
}

/// A DSL type.
///
/// Named kinds refer to a descriptor in the [`Registry`] by their DSL name;
/// collection kinds are structural, so two `int[]` are always equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum DslType {
    Basic(BasicType),
    Aggregate(String),
    AggregateAdapted(String),
    Enum(String),
    Function(Box<FunctionType>),
    List(Box<DslType>),
    Set(Box<DslType>),
    Map(Box<DslType>, Box<DslType>),
}

impl DslType {
    pub const INT: DslType = DslType::Basic(BasicType::Int);
    pub const FLOAT: DslType = DslType::Basic(BasicType::Float);
    pub const BOOL: DslType = DslType::Basic(BasicType::Bool);
    pub const STRING: DslType = DslType::Basic(BasicType::String);
    pub const GRAPH: DslType = DslType::Basic(BasicType::Graph);
    pub const NONE: DslType = DslType::Basic(BasicType::None);

    pub fn list(element: DslType) -> Self {
        DslType::List(Box::new(element))
    }

    pub fn set(element: DslType) -> Self {
        DslType::Set(Box::new(element))
    }

    pub fn map(key: DslType, value: DslType) -> Self {
        DslType::Map(Box::new(key), Box::new(value))
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            DslType::Basic(_) => TypeKind::Basic,
            DslType::Aggregate(_) => TypeKind::Aggregate,
            DslType::AggregateAdapted(_) => TypeKind::AggregateAdapted,
            DslType::Enum(_) => TypeKind::EnumType,
            DslType::Function(_) => TypeKind::FunctionType,
            DslType::List(_) => TypeKind::ListType,
            DslType::Set(_) => TypeKind::SetType,
            DslType::Map(_, _) => TypeKind::MapType,
        }
    }

    /// Stable name, unique within a registry
    pub fn name(&self) -> String {
        match self {
            DslType::Basic(basic) => basic.name().to_string(),
            DslType::Aggregate(name) | DslType::AggregateAdapted(name) | DslType::Enum(name) => {
                name.clone()
            }
            DslType::Function(func) => {
                let params: Vec<String> = func.params.iter().map(DslType::name).collect();
                format!("fn({}) -> {}", params.join(", "), func.ret.name())
            }
            DslType::List(element) => format!("{}[]", element.name()),
            DslType::Set(element) => format!("{}<>", element.name()),
            DslType::Map(key, value) => format!("[{} -> {}]", key.name(), value.name()),
        }
    }

    /// Name of the registry descriptor behind a named type, if any
    pub fn descriptor_name(&self) -> Option<&str> {
        match self {
            DslType::Aggregate(name) | DslType::AggregateAdapted(name) | DslType::Enum(name) => {
                Some(name)
            }
            DslType::Basic(BasicType::Opaque(name)) => Some(name),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, DslType::List(_) | DslType::Set(_) | DslType::Map(_, _))
    }

    /// Whether a value of type `actual` may be stored where `self` is expected.
    ///
    /// Types must match exactly; collections match when they are of the same
    /// kind and their element types are assignable.
    pub fn is_assignable_from(&self, actual: &DslType) -> bool {
        match (self, actual) {
            (DslType::List(expected), DslType::List(actual))
            | (DslType::Set(expected), DslType::Set(actual)) => expected.is_assignable_from(actual),
            (DslType::Map(ek, ev), DslType::Map(ak, av)) => {
                ek.is_assignable_from(ak) && ev.is_assignable_from(av)
            }
            (expected, actual) => expected == actual,
        }
    }
}

impl fmt::Display for DslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/* ===================== Name Conversion ===================== */

/// Convert a host identifier into its DSL name.
///
/// Every lower-case letter, digit or `_` followed by an upper-case letter gets
/// a `_` in between, then the whole name is lower-cased:
/// `DungeonConfig` becomes `dungeon_config`, `correctAnswerIndex` becomes
/// `correct_answer_index`, and snake_case names are left alone.
pub fn convert_to_dsl_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for ch in name.chars() {
        if let Some(prev) = previous {
            let prev_is_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit() || prev == '_';
            if prev_is_lower && ch.is_ascii_uppercase() {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
        previous = Some(ch);
    }
    out
}

/// Last path segment of a Rust type name, e.g. `Quiz` for `my_game::task::Quiz`
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
