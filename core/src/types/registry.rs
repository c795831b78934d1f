//! Type Registry
//!
//! Built once from host declarations, immutable afterwards. All callables are
//! `Send + Sync`, so one registry can be shared by any number of analysis and
//! interpretation runs.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use super::decl::{
    Arguments, BuildFn, DeclShape, EnumDecl, ExtensionMethodDecl, ExtensionPropertyDecl,
    FunctionDecl, FunctionFn, GetterFn, HostError, MethodFn, SetterFn, TypeDecl, TypeRef,
};
use super::value::{HostObject, Value};
use super::{BasicType, DslType, FunctionType};

/* ===================== Errors ===================== */

/// Malformed host declarations. Fatal: the registry is not built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeBuildError {
    #[error("type '{name}' is declared more than once")]
    DuplicateType { name: String },

    #[error("type '{type_name}' declares member '{member}' more than once")]
    DuplicateMember { type_name: String, member: String },

    #[error("'{owner}' references unknown type '{reference}'")]
    UnresolvedType { owner: String, reference: String },

    #[error("'{owner}' references '{reference}', which names several types: {}", candidates.join(", "))]
    AmbiguousType {
        owner: String,
        reference: String,
        candidates: Vec<String>,
    },

    #[error("type '{type_name}' has neither a constructor nor an adapter")]
    MissingBuilder { type_name: String },

    #[error("extension '{name}' targets unknown type '{target}'")]
    UnknownExtensionTarget { target: String, name: String },

    #[error("'{target}' already has an extension named '{name}'")]
    DuplicateExtension { target: String, name: String },

    #[error("function '{name}' is declared more than once")]
    DuplicateFunction { name: String },
}

/* ===================== Descriptors ===================== */

/// One resolved member of an aggregate type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberBinding {
    pub name: String,
    pub host_ident: String,
    pub ty: DslType,
}

/// How instances of an aggregate type come to be
#[derive(Clone)]
pub enum Builder {
    /// Host constructor, members in declared order
    Constructor(BuildFn),
    /// Adapter factory; may fail without aborting evaluation
    Adapter(BuildFn),
}

impl Builder {
    fn call(&self, args: &Arguments) -> Result<HostObject, HostError> {
        match self {
            Builder::Constructor(build) | Builder::Adapter(build) => build(args),
        }
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Builder::Constructor(_) => f.write_str("Constructor"),
            Builder::Adapter(_) => f.write_str("Adapter"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateType {
    pub name: String,
    pub host_name: String,
    pub members: Vec<MemberBinding>,
    pub builder: Builder,
    /// Objects of this type are tasks
    pub task: bool,
}

impl AggregateType {
    pub fn is_adapted(&self) -> bool {
        matches!(self.builder, Builder::Adapter(_))
    }

    pub fn dsl_type(&self) -> DslType {
        if self.is_adapted() {
            DslType::AggregateAdapted(self.name.clone())
        } else {
            DslType::Aggregate(self.name.clone())
        }
    }

    /// Member by DSL name, with its position in declared order
    pub fn member(&self, name: &str) -> Option<(usize, &MemberBinding)> {
        self.members.iter().enumerate().find(|(_, m)| m.name == name)
    }

    pub fn build(&self, args: &Arguments) -> Result<HostObject, HostError> {
        self.builder.call(args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub host_name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Aggregate(AggregateType),
    /// Host type with members only through extension bindings
    Opaque { name: String, host_name: String },
    Enum(EnumType),
}

impl TypeDescriptor {
    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Aggregate(agg) => &agg.name,
            TypeDescriptor::Opaque { name, .. } => name,
            TypeDescriptor::Enum(e) => &e.name,
        }
    }

    pub fn host_name(&self) -> &str {
        match self {
            TypeDescriptor::Aggregate(agg) => &agg.host_name,
            TypeDescriptor::Opaque { host_name, .. } => host_name,
            TypeDescriptor::Enum(e) => &e.host_name,
        }
    }

    pub fn dsl_type(&self) -> DslType {
        match self {
            TypeDescriptor::Aggregate(agg) => agg.dsl_type(),
            TypeDescriptor::Opaque { name, .. } => DslType::Basic(BasicType::Opaque(name.clone())),
            TypeDescriptor::Enum(e) => DslType::Enum(e.name.clone()),
        }
    }
}

#[derive(Clone)]
pub struct ExtensionProperty {
    /// Host type the binding is attached to
    pub host_name: String,
    pub name: String,
    pub ty: DslType,
    pub getter: GetterFn,
    pub setter: Option<SetterFn>,
}

impl ExtensionProperty {
    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub fn get(&self, host: &HostObject) -> Result<Value, HostError> {
        (self.getter)(host)
    }

    pub fn set(&self, host: &HostObject, value: Value) -> Result<(), HostError> {
        match &self.setter {
            Some(setter) => setter(host, value),
            None => Err(HostError::failed(format!("property '{}' is read-only", self.name))),
        }
    }
}

impl fmt::Debug for ExtensionProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionProperty")
            .field("host_name", &self.host_name)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("writable", &self.is_writable())
            .finish()
    }
}

#[derive(Clone)]
pub struct ExtensionMethod {
    pub host_name: String,
    pub name: String,
    pub signature: FunctionType,
    pub call: MethodFn,
}

impl fmt::Debug for ExtensionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionMethod")
            .field("host_name", &self.host_name)
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub signature: FunctionType,
    pub call: FunctionFn,
}

impl HostFunction {
    pub fn dsl_type(&self) -> DslType {
        DslType::Function(Box::new(self.signature.clone()))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Result of a two-level member lookup
#[derive(Debug, Clone, Copy)]
pub enum MemberLookup<'r> {
    /// Declared aggregate member and its position
    Field(usize, &'r MemberBinding),
    Extension(&'r ExtensionProperty),
}

impl MemberLookup<'_> {
    pub fn ty(&self) -> &DslType {
        match self {
            MemberLookup::Field(_, binding) => &binding.ty,
            MemberLookup::Extension(ext) => &ext.ty,
        }
    }
}

/* ===================== Registry ===================== */

#[derive(Debug)]
pub struct Registry {
    types: Vec<TypeDescriptor>,
    by_name: HashMap<String, usize>,
    properties: HashMap<(String, String), ExtensionProperty>,
    methods: HashMap<(String, String), ExtensionMethod>,
    functions: Vec<HostFunction>,
    collection_types: Vec<DslType>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Descriptors in declaration order
    pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    /// DSL type of a registered descriptor
    pub fn lookup_type(&self, name: &str) -> Option<DslType> {
        self.get(name).map(TypeDescriptor::dsl_type)
    }

    pub fn aggregate(&self, name: &str) -> Option<&AggregateType> {
        match self.get(name)? {
            TypeDescriptor::Aggregate(agg) => Some(agg),
            _ => None,
        }
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        match self.get(name)? {
            TypeDescriptor::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Whether values of `ty` describe tasks
    pub fn is_task_type(&self, ty: &DslType) -> bool {
        ty.descriptor_name()
            .and_then(|name| self.aggregate(name))
            .map(|agg| agg.task)
            .unwrap_or(false)
    }

    /// Host type behind a named DSL type
    pub fn host_name_of(&self, ty: &DslType) -> Option<&str> {
        ty.descriptor_name()
            .and_then(|name| self.get(name))
            .map(TypeDescriptor::host_name)
    }

    /// Resolve `member` on `ty`: aggregate members first, extension bindings second
    pub fn resolve_member(&self, ty: &DslType, member: &str) -> Option<MemberLookup<'_>> {
        let descriptor = self.get(ty.descriptor_name()?)?;
        if let TypeDescriptor::Aggregate(agg) = descriptor {
            if let Some((index, binding)) = agg.member(member) {
                return Some(MemberLookup::Field(index, binding));
            }
        }
        self.extension(descriptor.host_name(), member)
            .map(MemberLookup::Extension)
    }

    pub fn extension(&self, host_name: &str, name: &str) -> Option<&ExtensionProperty> {
        self.properties.get(&(host_name.to_string(), name.to_string()))
    }

    pub fn method(&self, ty: &DslType, name: &str) -> Option<&ExtensionMethod> {
        let host_name = self.host_name_of(ty)?;
        self.methods.get(&(host_name.to_string(), name.to_string()))
    }

    pub fn function(&self, name: &str) -> Option<&HostFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &HostFunction> {
        self.functions.iter()
    }

    /// Collection types referenced by declarations, in first-use order
    pub fn collection_types(&self) -> &[DslType] {
        &self.collection_types
    }
}

/* ===================== Builder ===================== */

/// Collects host declarations; [`RegistryBuilder::build`] validates them all
/// at once.
#[derive(Default)]
pub struct RegistryBuilder {
    types: Vec<TypeDecl>,
    enums: Vec<EnumDecl>,
    functions: Vec<FunctionDecl>,
    properties: Vec<ExtensionPropertyDecl>,
    methods: Vec<ExtensionMethodDecl>,
}

impl RegistryBuilder {
    pub fn register_type(mut self, decl: TypeDecl) -> Self {
        self.types.push(decl);
        self
    }

    pub fn register_enum(mut self, decl: EnumDecl) -> Self {
        self.enums.push(decl);
        self
    }

    pub fn register_function(mut self, decl: FunctionDecl) -> Self {
        self.functions.push(decl);
        self
    }

    /// Extension bindings may target types registered before or after them
    pub fn register_extension_property(mut self, decl: ExtensionPropertyDecl) -> Self {
        self.properties.push(decl);
        self
    }

    pub fn register_extension_method(mut self, decl: ExtensionMethodDecl) -> Self {
        self.methods.push(decl);
        self
    }

    pub fn build(self) -> Result<Registry, TypeBuildError> {
        let mut names = NameTable::default();

        // Pass 1: every type name, so members may reference any type
        for decl in &self.types {
            let name = decl.dsl_name();
            let ty = match decl.shape {
                DeclShape::Aggregate => DslType::Aggregate(name.clone()),
                DeclShape::Adapted => DslType::AggregateAdapted(name.clone()),
                DeclShape::Opaque => DslType::Basic(BasicType::Opaque(name.clone())),
            };
            names.declare(name, decl.host_name().to_string(), ty)?;
        }
        for decl in &self.enums {
            let name = decl
                .name_override
                .clone()
                .unwrap_or_else(|| super::convert_to_dsl_name(&decl.host_name));
            let ty = DslType::Enum(name.clone());
            names.declare(name, decl.host_name.clone(), ty)?;
        }

        // Pass 2: resolve members and builders
        let mut types = Vec::with_capacity(names.entries.len());
        for decl in self.types {
            types.push(resolve_type_decl(decl, &mut names)?);
        }
        for decl in self.enums {
            let name = decl
                .name_override
                .unwrap_or_else(|| super::convert_to_dsl_name(&decl.host_name));
            let mut variants: Vec<String> = Vec::with_capacity(decl.variants.len());
            for variant in decl.variants {
                if variants.contains(&variant) {
                    return Err(TypeBuildError::DuplicateMember {
                        type_name: name,
                        member: variant,
                    });
                }
                variants.push(variant);
            }
            debug!(type_name = %name, variants = variants.len(), "Registered enum");
            types.push(TypeDescriptor::Enum(EnumType {
                name,
                host_name: decl.host_name,
                variants,
            }));
        }

        let mut functions: Vec<HostFunction> = Vec::with_capacity(self.functions.len());
        for decl in self.functions {
            if functions.iter().any(|f| f.name == decl.name) {
                return Err(TypeBuildError::DuplicateFunction { name: decl.name });
            }
            let signature = names.signature(&decl.name, &decl.params, &decl.ret)?;
            debug!(function = %decl.name, "Registered function");
            functions.push(HostFunction {
                name: decl.name,
                signature,
                call: decl.call,
            });
        }

        let mut properties = HashMap::new();
        for decl in self.properties {
            let host_name = names.extension_target(&decl.target, &decl.name)?;
            let ty = names.resolve(&decl.name, &decl.ty)?;
            let key = (host_name.clone(), decl.name.clone());
            if properties.contains_key(&key) {
                return Err(TypeBuildError::DuplicateExtension {
                    target: decl.target,
                    name: decl.name,
                });
            }
            debug!(target = %host_name, property = %decl.name, "Registered extension property");
            properties.insert(
                key,
                ExtensionProperty {
                    host_name,
                    name: decl.name,
                    ty,
                    getter: decl.getter,
                    setter: decl.setter,
                },
            );
        }

        let mut methods = HashMap::new();
        for decl in self.methods {
            let host_name = names.extension_target(&decl.target, &decl.name)?;
            let signature = names.signature(&decl.name, &decl.params, &decl.ret)?;
            let key = (host_name.clone(), decl.name.clone());
            if methods.contains_key(&key) {
                return Err(TypeBuildError::DuplicateExtension {
                    target: decl.target,
                    name: decl.name,
                });
            }
            debug!(target = %host_name, method = %decl.name, "Registered extension method");
            methods.insert(
                key,
                ExtensionMethod {
                    host_name,
                    name: decl.name,
                    signature,
                    call: decl.call,
                },
            );
        }

        let by_name = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();

        info!(
            types = types.len(),
            functions = functions.len(),
            extensions = properties.len() + methods.len(),
            "Type registry built"
        );

        Ok(Registry {
            types,
            by_name,
            properties,
            methods,
            functions,
            collection_types: names.collections,
        })
    }
}

fn resolve_type_decl(decl: TypeDecl, names: &mut NameTable) -> Result<TypeDescriptor, TypeBuildError> {
    let name = decl.dsl_name();

    if decl.shape == DeclShape::Opaque {
        debug!(type_name = %name, host = %decl.host_name, "Registered opaque type");
        return Ok(TypeDescriptor::Opaque {
            name,
            host_name: decl.host_name,
        });
    }

    let mut members: Vec<MemberBinding> = Vec::with_capacity(decl.members.len());
    for member in &decl.members {
        let member_name = member.dsl_name();
        if members.iter().any(|m| m.name == member_name) {
            return Err(TypeBuildError::DuplicateMember {
                type_name: name,
                member: member_name,
            });
        }
        let ty = names.resolve(&name, &member.ty)?;
        members.push(MemberBinding {
            name: member_name,
            host_ident: member.host_ident.clone(),
            ty,
        });
    }

    let builder = match (decl.shape, decl.builder) {
        (DeclShape::Adapted, Some(build)) => Builder::Adapter(build),
        (_, Some(build)) => Builder::Constructor(build),
        (_, None) => return Err(TypeBuildError::MissingBuilder { type_name: name }),
    };

    debug!(
        type_name = %name,
        host = %decl.host_name,
        members = members.len(),
        adapted = matches!(builder, Builder::Adapter(_)),
        "Registered aggregate type"
    );

    Ok(TypeDescriptor::Aggregate(AggregateType {
        name,
        host_name: decl.host_name,
        members,
        builder,
        task: decl.task,
    }))
}

/// Names known after the first pass, used to resolve [`TypeRef`]s
#[derive(Default)]
struct NameTable {
    /// (DSL name, host name, DSL type)
    entries: Vec<(String, String, DslType)>,
    collections: Vec<DslType>,
}

impl NameTable {
    fn declare(&mut self, name: String, host_name: String, ty: DslType) -> Result<(), TypeBuildError> {
        if self.entries.iter().any(|(n, _, _)| *n == name) {
            return Err(TypeBuildError::DuplicateType { name });
        }
        self.entries.push((name, host_name, ty));
        Ok(())
    }

    fn named(&self, owner: &str, reference: &str) -> Result<DslType, TypeBuildError> {
        if let Some((_, _, ty)) = self.entries.iter().find(|(n, _, _)| n == reference) {
            return Ok(ty.clone());
        }
        let candidates: Vec<&(String, String, DslType)> = self
            .entries
            .iter()
            .filter(|(_, host, _)| host == reference)
            .collect();
        match candidates.as_slice() {
            [] => Err(TypeBuildError::UnresolvedType {
                owner: owner.to_string(),
                reference: reference.to_string(),
            }),
            [(_, _, ty)] => Ok(ty.clone()),
            many => Err(TypeBuildError::AmbiguousType {
                owner: owner.to_string(),
                reference: reference.to_string(),
                candidates: many.iter().map(|(n, _, _)| n.clone()).collect(),
            }),
        }
    }

    fn resolve(&mut self, owner: &str, reference: &TypeRef) -> Result<DslType, TypeBuildError> {
        let ty = match reference {
            TypeRef::Int => DslType::INT,
            TypeRef::Float => DslType::FLOAT,
            TypeRef::Bool => DslType::BOOL,
            TypeRef::String => DslType::STRING,
            TypeRef::Graph => DslType::GRAPH,
            TypeRef::None => DslType::NONE,
            TypeRef::Named(name) => return self.named(owner, name),
            TypeRef::List(element) => DslType::list(self.resolve(owner, element)?),
            TypeRef::Set(element) => DslType::set(self.resolve(owner, element)?),
            TypeRef::Map(key, value) => {
                DslType::map(self.resolve(owner, key)?, self.resolve(owner, value)?)
            }
        };
        if ty.is_collection() && !self.collections.contains(&ty) {
            self.collections.push(ty.clone());
        }
        Ok(ty)
    }

    fn signature(
        &mut self,
        owner: &str,
        params: &[TypeRef],
        ret: &TypeRef,
    ) -> Result<FunctionType, TypeBuildError> {
        let params = params
            .iter()
            .map(|p| self.resolve(owner, p))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = self.resolve(owner, ret)?;
        Ok(FunctionType::new(params, ret))
    }

    /// Host name an extension attaches to; `target` is a host or DSL name
    fn extension_target(&self, target: &str, name: &str) -> Result<String, TypeBuildError> {
        self.entries
            .iter()
            .find(|(dsl, host, _)| host == target || dsl == target)
            .map(|(_, host, _)| host.clone())
            .ok_or_else(|| TypeBuildError::UnknownExtensionTarget {
                target: target.to_string(),
                name: name.to_string(),
            })
    }
}
