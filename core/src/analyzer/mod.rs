//! Semantic Analyzer
//!
//! Single pass over one file's definitions. Resolves every name against the
//! entry points, the enclosing `let` scopes and the [`Registry`], checks types,
//! and produces the typed tree in [`typed`]. Nothing here touches host state;
//! constructors and adapters only run in the interpreter.
//!
//! Analysis of a file stops at its first error. Other files are unaffected.

pub mod typed;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::debug;

use crate::ast::{BodyItem, Definition, Expr, GraphDef, Ident, Location, ObjectDef, ParsedFile, Span};
use crate::entry_points::EntryPointRegistry;
use crate::symbols::SymbolTable;
use crate::types::{AggregateType, DslType, MemberLookup, Registry, TypeDescriptor};

pub use typed::{
    AnalyzedDefinition, AnalyzedFile, CollectionKind, ConstructItem, Construction, DefinitionBody,
    Literal, MemberRef, Method, TaskChain, TaskRef, TypedExpr, TypedKind,
};

/// Structural member of task definitions naming the tasks they depend on
pub const DEPENDS_ON: &str = "depends_on";

/* ===================== Errors ===================== */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    #[error("{location}: '{name}' is already declared{}", previous_declaration(.previous))]
    DuplicateSymbol {
        name: String,
        location: Location,
        previous: Option<Location>,
    },

    #[error("{location}: unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String, location: Location },

    #[error("{location}: type '{type_name}' has no member '{member}'")]
    UnresolvedMember {
        type_name: String,
        member: String,
        location: Location,
    },

    #[error("{location}: '{context}' expects {expected}, found {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
        location: Location,
    },

    #[error("{location}: cannot infer the type of {what}")]
    AmbiguousType { what: String, location: Location },

    #[error("{location}: '{callee}' takes {expected} argument(s), {actual} given")]
    ArityMismatch {
        callee: String,
        expected: usize,
        actual: usize,
        location: Location,
    },
}

fn previous_declaration(previous: &Option<Location>) -> String {
    match previous {
        Some(location) => format!(" (first declared at {})", location),
        None => String::new(),
    }
}

impl SemanticError {
    pub fn location(&self) -> &Location {
        match self {
            SemanticError::DuplicateSymbol { location, .. }
            | SemanticError::UnresolvedSymbol { location, .. }
            | SemanticError::UnresolvedMember { location, .. }
            | SemanticError::TypeMismatch { location, .. }
            | SemanticError::AmbiguousType { location, .. }
            | SemanticError::ArityMismatch { location, .. } => location,
        }
    }
}

pub type SemanticResult<T> = Result<T, SemanticError>;

/* ===================== Analyzer ===================== */

/// What a name in scope is bound to
#[derive(Debug, Clone)]
enum Symbol {
    Entry(DslType),
    Local(DslType),
}

pub struct Analyzer<'a> {
    registry: &'a Registry,
    entries: &'a EntryPointRegistry,
    scope: SymbolTable<Symbol>,
    file: Arc<str>,
}

/// Analyze every definition of a file that passed entry point registration
pub fn analyze_file(
    file: &ParsedFile,
    registry: &Registry,
    entries: &EntryPointRegistry,
) -> SemanticResult<AnalyzedFile> {
    let file_name = file.file_name();
    if let Some(err) = entries.failure(&file_name) {
        return Err(err.clone());
    }

    let mut analyzer = Analyzer::new(registry, entries, file_name.clone());
    let definitions = file
        .document
        .definitions
        .iter()
        .map(|def| analyzer.analyze_definition(def))
        .collect::<SemanticResult<Vec<_>>>()?;

    debug!(file = %file_name, definitions = definitions.len(), "Analyzed file");
    Ok(AnalyzedFile {
        path: file.path.clone(),
        file: file_name,
        definitions,
    })
}

impl<'a> Analyzer<'a> {
    pub fn new(registry: &'a Registry, entries: &'a EntryPointRegistry, file: Arc<str>) -> Self {
        Self {
            registry,
            entries,
            scope: entries.global_scope(|entry| Symbol::Entry(entry.ty.clone())),
            file,
        }
    }

    fn at(&self, span: Span) -> Location {
        Location::new(self.file.clone(), span)
    }

    pub fn analyze_definition(&mut self, def: &Definition) -> SemanticResult<AnalyzedDefinition> {
        match def {
            Definition::Object(def) => self.analyze_object_def(def),
            Definition::Graph(def) => self.analyze_graph_def(def),
        }
    }

    fn analyze_object_def(&mut self, def: &ObjectDef) -> SemanticResult<AnalyzedDefinition> {
        let aggregate = self.aggregate_for(&def.type_name)?;
        let (construction, dependencies) =
            self.analyze_body(aggregate, &def.body, self.at(def.span), aggregate.task)?;

        Ok(AnalyzedDefinition {
            name: def.name.name.clone(),
            location: self.at(def.name.span),
            ty: aggregate.dsl_type(),
            body: DefinitionBody::Object {
                construction,
                dependencies,
            },
        })
    }

    fn analyze_graph_def(&mut self, def: &GraphDef) -> SemanticResult<AnalyzedDefinition> {
        let mut statements = Vec::with_capacity(def.statements.len());
        for stmt in &def.statements {
            let groups = stmt
                .groups
                .iter()
                .map(|group| {
                    group
                        .iter()
                        .map(|task| self.task_ref(task))
                        .collect::<SemanticResult<Vec<_>>>()
                })
                .collect::<SemanticResult<Vec<_>>>()?;
            statements.push(TaskChain { groups, kind: stmt.kind });
        }

        Ok(AnalyzedDefinition {
            name: def.name.name.clone(),
            location: self.at(def.name.span),
            ty: DslType::GRAPH,
            body: DefinitionBody::Graph { statements },
        })
    }

    /// A name that must refer to a task entry point
    fn task_ref(&self, ident: &Ident) -> SemanticResult<TaskRef> {
        let location = self.at(ident.span);
        let entry = self.entries.resolve(&ident.name, &location)?;
        if !self.registry.is_task_type(&entry.ty) {
            return Err(SemanticError::TypeMismatch {
                context: ident.name.clone(),
                expected: "a task".to_string(),
                actual: entry.ty.name(),
                location,
            });
        }
        Ok(TaskRef {
            name: ident.name.clone(),
            location,
        })
    }

    fn aggregate_for(&self, type_name: &Ident) -> SemanticResult<&'a AggregateType> {
        let registry = self.registry;
        match registry.get(&type_name.name) {
            Some(TypeDescriptor::Aggregate(aggregate)) => Ok(aggregate),
            Some(other) => Err(SemanticError::TypeMismatch {
                context: type_name.name.clone(),
                expected: "a constructible type".to_string(),
                actual: other.dsl_type().name(),
                location: self.at(type_name.span),
            }),
            None => Err(SemanticError::UnresolvedSymbol {
                name: type_name.name.clone(),
                location: self.at(type_name.span),
            }),
        }
    }

    /* ===================== Bodies ===================== */

    /// Match a body's items against `aggregate`'s members. `let` bindings live
    /// in a scope that ends with the body.
    fn analyze_body(
        &mut self,
        aggregate: &'a AggregateType,
        body: &[BodyItem],
        location: Location,
        allow_dependencies: bool,
    ) -> SemanticResult<(Construction, Vec<TaskRef>)> {
        self.scope.push_scope();
        let result = self.analyze_body_items(aggregate, body, &location, allow_dependencies);
        self.scope.pop_scope();
        let (items, dependencies) = result?;

        Ok((
            Construction {
                type_name: aggregate.name.clone(),
                items,
                location,
            },
            dependencies,
        ))
    }

    fn analyze_body_items(
        &mut self,
        aggregate: &'a AggregateType,
        body: &[BodyItem],
        location: &Location,
        allow_dependencies: bool,
    ) -> SemanticResult<(Vec<ConstructItem>, Vec<TaskRef>)> {
        let registry = self.registry;
        let member_count = aggregate.members.len();
        let mut filled = vec![false; member_count];
        let mut positional = 0;
        let mut items = Vec::with_capacity(body.len());
        let mut dependencies: Option<Vec<TaskRef>> = None;

        for item in body {
            match item {
                BodyItem::Let { name, value, .. } => {
                    let value = self.analyze_expr(value, None)?;
                    if self.scope.declare(name.name.clone(), Symbol::Local(value.ty.clone())).is_err() {
                        return Err(SemanticError::DuplicateSymbol {
                            name: name.name.clone(),
                            location: self.at(name.span),
                            previous: None,
                        });
                    }
                    items.push(ConstructItem::Let {
                        name: name.name.clone(),
                        value,
                    });
                }

                BodyItem::Positional { value, span } => {
                    let index = positional;
                    positional += 1;
                    let Some(member) = aggregate.members.get(index) else {
                        return Err(SemanticError::ArityMismatch {
                            callee: aggregate.name.clone(),
                            expected: member_count,
                            actual: argument_count(registry, aggregate, body),
                            location: self.at(*span),
                        });
                    };
                    if filled[index] {
                        return Err(SemanticError::DuplicateSymbol {
                            name: member.name.clone(),
                            location: self.at(*span),
                            previous: None,
                        });
                    }
                    let value = self.analyze_expr(value, Some(&member.ty))?;
                    let value = self.coerce(value, &member.ty, &member.name)?;
                    filled[index] = true;
                    items.push(ConstructItem::Arg { index, value });
                }

                BodyItem::Named { name, value, span } => {
                    match registry.resolve_member(&aggregate.dsl_type(), &name.name) {
                        Some(MemberLookup::Field(index, member)) => {
                            if filled[index] {
                                return Err(SemanticError::DuplicateSymbol {
                                    name: member.name.clone(),
                                    location: self.at(name.span),
                                    previous: None,
                                });
                            }
                            let value = self.analyze_expr(value, Some(&member.ty))?;
                            let value = self.coerce(value, &member.ty, &member.name)?;
                            filled[index] = true;
                            items.push(ConstructItem::Arg { index, value });
                        }
                        _ if name.name == DEPENDS_ON && allow_dependencies => {
                            if dependencies.is_some() {
                                return Err(SemanticError::DuplicateSymbol {
                                    name: name.name.clone(),
                                    location: self.at(name.span),
                                    previous: None,
                                });
                            }
                            dependencies = Some(self.dependency_list(value)?);
                        }
                        Some(MemberLookup::Extension(property)) if property.is_writable() => {
                            let value = self.analyze_expr(value, Some(&property.ty))?;
                            let value = self.coerce(value, &property.ty, &property.name)?;
                            items.push(ConstructItem::Write {
                                name: property.name.clone(),
                                value,
                                location: self.at(*span),
                            });
                        }
                        _ => {
                            return Err(SemanticError::UnresolvedMember {
                                type_name: aggregate.name.clone(),
                                member: name.name.clone(),
                                location: self.at(name.span),
                            })
                        }
                    }
                }
            }
        }

        let supplied = filled.iter().filter(|f| **f).count();
        if supplied != member_count {
            return Err(SemanticError::ArityMismatch {
                callee: aggregate.name.clone(),
                expected: member_count,
                actual: supplied,
                location: location.clone(),
            });
        }

        Ok((items, dependencies.unwrap_or_default()))
    }

    /// `depends_on: [A, B]`: names of task entry points
    fn dependency_list(&self, value: &Expr) -> SemanticResult<Vec<TaskRef>> {
        let Expr::List { elements, .. } = value else {
            return Err(SemanticError::TypeMismatch {
                context: DEPENDS_ON.to_string(),
                expected: "a list of task names".to_string(),
                actual: describe_expr(value).to_string(),
                location: self.at(value.span()),
            });
        };

        elements
            .iter()
            .map(|element| match element {
                Expr::Ident { name, span } => self.task_ref(&Ident::new(name.clone(), *span)),
                other => Err(SemanticError::TypeMismatch {
                    context: DEPENDS_ON.to_string(),
                    expected: "a task name".to_string(),
                    actual: describe_expr(other).to_string(),
                    location: self.at(other.span()),
                }),
            })
            .collect()
    }

    /// Accept `expr` where `expected` is required, inserting a single-argument
    /// adapter construction when that makes the types fit.
    fn coerce(&self, expr: TypedExpr, expected: &DslType, context: &str) -> SemanticResult<TypedExpr> {
        if expected.is_assignable_from(&expr.ty) {
            return Ok(expr);
        }

        if let Some(adapter) = self.implicit_adapter(expected, &expr.ty) {
            let location = expr.location.clone();
            return Ok(TypedExpr {
                kind: TypedKind::Construct(Construction {
                    type_name: adapter.name.clone(),
                    items: vec![ConstructItem::Arg { index: 0, value: expr }],
                    location: location.clone(),
                }),
                ty: expected.clone(),
                location,
            });
        }

        Err(SemanticError::TypeMismatch {
            context: context.to_string(),
            expected: expected.name(),
            actual: expr.ty.name(),
            location: expr.location,
        })
    }

    fn implicit_adapter(&self, expected: &DslType, actual: &DslType) -> Option<&'a AggregateType> {
        let registry = self.registry;
        let DslType::AggregateAdapted(name) = expected else {
            return None;
        };
        let adapter = registry.aggregate(name)?;
        match adapter.members.as_slice() {
            [only] if only.ty.is_assignable_from(actual) => Some(adapter),
            _ => None,
        }
    }

    /* ===================== Expressions ===================== */

    /// Type-check `expr`. `expected` is the type the context requires, if
    /// known; it decides what an empty literal is and whether `[...]` is a
    /// list or a set.
    pub fn analyze_expr(&mut self, expr: &Expr, expected: Option<&DslType>) -> SemanticResult<TypedExpr> {
        let location = self.at(expr.span());
        let typed = |kind, ty| TypedExpr {
            kind,
            ty,
            location: location.clone(),
        };

        match expr {
            Expr::LitInt { v, .. } => Ok(typed(TypedKind::Literal(Literal::Int(*v)), DslType::INT)),
            Expr::LitFloat { v, .. } => Ok(typed(TypedKind::Literal(Literal::Float(*v)), DslType::FLOAT)),
            Expr::LitBool { v, .. } => Ok(typed(TypedKind::Literal(Literal::Bool(*v)), DslType::BOOL)),
            Expr::LitStr { v, .. } => Ok(typed(TypedKind::Literal(Literal::Str(v.clone())), DslType::STRING)),

            Expr::Ident { name, .. } => match self.scope.lookup(name) {
                Some(Symbol::Local(ty)) => Ok(typed(TypedKind::Local(name.clone()), ty.clone())),
                Some(Symbol::Entry(ty)) => Ok(typed(TypedKind::EntryRef(name.clone()), ty.clone())),
                None => Err(SemanticError::UnresolvedSymbol {
                    name: name.clone(),
                    location: location.clone(),
                }),
            },

            Expr::List { elements, .. } => self.analyze_list(elements, expected, location.clone()),
            Expr::Map { entries, .. } => self.analyze_map(entries, expected, location.clone()),

            Expr::Construct { type_name, body, .. } => {
                let aggregate = self.aggregate_for(type_name)?;
                let (construction, _) = self.analyze_body(aggregate, body, location.clone(), false)?;
                Ok(typed(TypedKind::Construct(construction), aggregate.dsl_type()))
            }

            Expr::Member { object, member, .. } => self.analyze_member(object, member, location.clone()),

            Expr::Call { callee, args, .. } => {
                let registry = self.registry;
                let function = registry
                    .function(&callee.name)
                    .ok_or_else(|| SemanticError::UnresolvedSymbol {
                        name: callee.name.clone(),
                        location: self.at(callee.span),
                    })?;
                let args = self.analyze_args(&callee.name, &function.signature.params, args, &location)?;
                Ok(typed(
                    TypedKind::Call {
                        function: callee.name.clone(),
                        args,
                    },
                    function.signature.ret.clone(),
                ))
            }

            Expr::MethodCall {
                receiver, method, args, ..
            } => {
                let receiver = self.analyze_expr(receiver, None)?;
                let (resolved, params, ret) = self.resolve_method(&receiver.ty, method)?;
                let args = self.analyze_args(&method.name, &params, args, &location)?;
                Ok(typed(
                    TypedKind::MethodCall {
                        receiver: Box::new(receiver),
                        method: resolved,
                        args,
                    },
                    ret,
                ))
            }
        }
    }

    fn analyze_list(
        &mut self,
        elements: &[Expr],
        expected: Option<&DslType>,
        location: Location,
    ) -> SemanticResult<TypedExpr> {
        let (kind, expected_element) = match expected {
            Some(DslType::Set(element)) => (CollectionKind::Set, Some((**element).clone())),
            Some(DslType::List(element)) => (CollectionKind::List, Some((**element).clone())),
            _ => (CollectionKind::List, None),
        };
        let collection_type = |element: DslType| match kind {
            CollectionKind::List => DslType::list(element),
            CollectionKind::Set => DslType::set(element),
        };

        let mut rest = elements.iter();
        let Some(first) = rest.next() else {
            // `[]` is also the empty map when one is expected
            if let Some(DslType::Map(..)) = expected {
                return self.analyze_map(&[], expected, location);
            }
            return match expected_element {
                Some(element) => Ok(TypedExpr {
                    kind: TypedKind::Collection {
                        kind,
                        elements: Vec::new(),
                    },
                    ty: collection_type(element),
                    location,
                }),
                None => Err(SemanticError::AmbiguousType {
                    what: "an empty list literal".to_string(),
                    location,
                }),
            };
        };

        let first = self.analyze_expr(first, expected_element.as_ref())?;
        let (first, element_type) = match expected_element {
            Some(ty) => (self.coerce(first, &ty, "list element")?, ty),
            None => {
                let ty = first.ty.clone();
                (first, ty)
            }
        };

        let mut typed = Vec::with_capacity(elements.len());
        typed.push(first);
        for element in rest {
            let value = self.analyze_expr(element, Some(&element_type))?;
            typed.push(self.coerce(value, &element_type, "list element")?);
        }

        Ok(TypedExpr {
            kind: TypedKind::Collection {
                kind,
                elements: typed,
            },
            ty: collection_type(element_type),
            location,
        })
    }

    fn analyze_map(
        &mut self,
        entries: &[(Expr, Expr)],
        expected: Option<&DslType>,
        location: Location,
    ) -> SemanticResult<TypedExpr> {
        let mut types = match expected {
            Some(DslType::Map(key, value)) => Some(((**key).clone(), (**value).clone())),
            _ => None,
        };

        let mut typed = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.analyze_expr(key, types.as_ref().map(|(k, _)| k))?;
            let value = self.analyze_expr(value, types.as_ref().map(|(_, v)| v))?;
            // The first entry fixes the types when the context does not
            let (key_type, value_type) = types.get_or_insert_with(|| (key.ty.clone(), value.ty.clone()));
            let key = self.coerce(key, key_type, "map key")?;
            let value = self.coerce(value, value_type, "map value")?;
            typed.push((key, value));
        }

        match types {
            Some((key, value)) => Ok(TypedExpr {
                kind: TypedKind::Map(typed),
                ty: DslType::map(key, value),
                location,
            }),
            None => Err(SemanticError::AmbiguousType {
                what: "an empty map literal".to_string(),
                location,
            }),
        }
    }

    fn analyze_member(&mut self, object: &Expr, member: &Ident, location: Location) -> SemanticResult<TypedExpr> {
        let registry = self.registry;

        // `difficulty.hard` names an enum variant unless `difficulty` is bound
        if let Expr::Ident { name, .. } = object {
            if self.scope.lookup(name).is_none() {
                if let Some(enum_type) = registry.enum_type(name) {
                    if !enum_type.has_variant(&member.name) {
                        return Err(SemanticError::UnresolvedMember {
                            type_name: name.clone(),
                            member: member.name.clone(),
                            location: self.at(member.span),
                        });
                    }
                    return Ok(TypedExpr {
                        kind: TypedKind::EnumVariant {
                            type_name: name.clone(),
                            variant: member.name.clone(),
                        },
                        ty: DslType::Enum(name.clone()),
                        location,
                    });
                }
            }
        }

        let object = self.analyze_expr(object, None)?;
        let (member_ref, ty) = match registry.resolve_member(&object.ty, &member.name) {
            Some(MemberLookup::Field(index, binding)) => (
                MemberRef::Field {
                    index,
                    name: binding.name.clone(),
                },
                binding.ty.clone(),
            ),
            Some(MemberLookup::Extension(property)) => (
                MemberRef::Extension {
                    host_name: property.host_name.clone(),
                    name: property.name.clone(),
                },
                property.ty.clone(),
            ),
            None => {
                return Err(SemanticError::UnresolvedMember {
                    type_name: object.ty.name(),
                    member: member.name.clone(),
                    location: self.at(member.span),
                })
            }
        };

        Ok(TypedExpr {
            kind: TypedKind::Member {
                object: Box::new(object),
                member: member_ref,
            },
            ty,
            location,
        })
    }

    /// Built-in collection methods first, extension methods second
    fn resolve_method(&self, receiver: &DslType, method: &Ident) -> SemanticResult<(Method, Vec<DslType>, DslType)> {
        let builtin = match (receiver, method.name.as_str()) {
            (DslType::List(_) | DslType::Set(_) | DslType::Map(_, _), "size") => {
                Some((Method::Size, Vec::new(), DslType::INT))
            }
            (DslType::List(element) | DslType::Set(element), "contains") => {
                Some((Method::Contains, vec![(**element).clone()], DslType::BOOL))
            }
            (DslType::Map(key, _), "contains") => Some((Method::Contains, vec![(**key).clone()], DslType::BOOL)),
            (DslType::List(element), "get") => Some((Method::Get, vec![DslType::INT], (**element).clone())),
            (DslType::Map(key, value), "get") => {
                Some((Method::Get, vec![(**key).clone()], (**value).clone()))
            }
            _ => None,
        };
        if let Some(builtin) = builtin {
            return Ok(builtin);
        }

        match self.registry.method(receiver, &method.name) {
            Some(extension) => Ok((
                Method::Extension(extension.name.clone()),
                extension.signature.params.clone(),
                extension.signature.ret.clone(),
            )),
            None => Err(SemanticError::UnresolvedMember {
                type_name: receiver.name(),
                member: method.name.clone(),
                location: self.at(method.span),
            }),
        }
    }

    fn analyze_args(
        &mut self,
        callee: &str,
        params: &[DslType],
        args: &[Expr],
        location: &Location,
    ) -> SemanticResult<Vec<TypedExpr>> {
        if args.len() != params.len() {
            return Err(SemanticError::ArityMismatch {
                callee: callee.to_string(),
                expected: params.len(),
                actual: args.len(),
                location: location.clone(),
            });
        }

        args.iter()
            .zip(params)
            .enumerate()
            .map(|(position, (arg, param))| {
                let value = self.analyze_expr(arg, Some(param))?;
                self.coerce(value, param, &format!("{} argument {}", callee, position + 1))
            })
            .collect()
    }
}

/// Arguments a body supplies to members, positional or named
fn argument_count(registry: &Registry, aggregate: &AggregateType, body: &[BodyItem]) -> usize {
    body.iter()
        .filter(|item| match item {
            BodyItem::Positional { .. } => true,
            BodyItem::Named { name, .. } => matches!(
                registry.resolve_member(&aggregate.dsl_type(), &name.name),
                Some(MemberLookup::Field(..))
            ),
            BodyItem::Let { .. } => false,
        })
        .count()
}

fn describe_expr(expr: &Expr) -> &'static str {
    match expr {
        Expr::LitInt { .. } => "an int literal",
        Expr::LitFloat { .. } => "a float literal",
        Expr::LitBool { .. } => "a bool literal",
        Expr::LitStr { .. } => "a string literal",
        Expr::Ident { .. } => "a name",
        Expr::List { .. } => "a list literal",
        Expr::Map { .. } => "a map literal",
        Expr::Construct { .. } => "a construction",
        Expr::Member { .. } => "a member access",
        Expr::Call { .. } => "a call",
        Expr::MethodCall { .. } => "a method call",
    }
}
