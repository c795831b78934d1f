//! Host declaration interface
//!
//! Host code describes its types with an explicit registration table instead
//! of markers on the types themselves. A declaration names the host type,
//! lists the members visible to the DSL (in constructor order) and supplies
//! either a constructor or an adapter factory.
//!
//! ```ignore
//! let decl = TypeDecl::aggregate("DungeonConfig")
//!     .member("dependency_graph", TypeRef::Graph)
//!     .member_as("display_name", "name", TypeRef::String)
//!     .constructor(|args| {
//!         Ok(DungeonConfig {
//!             dependency_graph: args.graph("dependency_graph")?,
//!             display_name: args.string("name")?,
//!         })
//!     });
//! ```

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use super::value::{HostObject, Instance, TaskGraph, Value};
use super::{convert_to_dsl_name, short_type_name};

/* ===================== Errors ===================== */

/// Failure reported by host code: constructors, adapters, extension bindings
/// and functions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// A required argument was absent
    #[error("missing value for '{member}'")]
    MissingValue { member: String },

    #[error("'{member}' expected {expected}, got {actual}")]
    WrongValue {
        member: String,
        expected: String,
        actual: String,
    },

    #[error("receiver is not a {expected}")]
    WrongHostType { expected: String },

    #[error("{0}")]
    Failed(String),
}

impl HostError {
    pub fn failed(message: impl Into<String>) -> Self {
        HostError::Failed(message.into())
    }
}

/* ===================== Callable Aliases ===================== */

pub type BuildFn = Arc<dyn Fn(&Arguments) -> Result<HostObject, HostError> + Send + Sync>;
pub type GetterFn = Arc<dyn Fn(&HostObject) -> Result<Value, HostError> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&HostObject, Value) -> Result<(), HostError> + Send + Sync>;
pub type FunctionFn = Arc<dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&HostObject, &[Value]) -> Result<Value, HostError> + Send + Sync>;

/* ===================== Type References ===================== */

/// Type of a member or parameter as the host writes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Int,
    Float,
    Bool,
    String,
    Graph,
    None,
    /// Another declared type, by host name or DSL name
    Named(String),
    List(Box<TypeRef>),
    Set(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Reference to a host type by its Rust type
    pub fn of<T: ?Sized>() -> Self {
        TypeRef::Named(short_type_name::<T>().to_string())
    }

    pub fn list(element: TypeRef) -> Self {
        TypeRef::List(Box::new(element))
    }

    pub fn set(element: TypeRef) -> Self {
        TypeRef::Set(Box::new(element))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map(Box::new(key), Box::new(value))
    }
}

/* ===================== Declarations ===================== */

/// One DSL-visible member (field or factory parameter)
#[derive(Debug, Clone)]
pub struct MemberDecl {
    pub host_ident: String,
    pub name_override: Option<String>,
    pub ty: TypeRef,
}

impl MemberDecl {
    /// Exposed name: the override if given, the converted host identifier otherwise
    pub fn dsl_name(&self) -> String {
        match &self.name_override {
            Some(name) => name.clone(),
            None => convert_to_dsl_name(&self.host_ident),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclShape {
    /// Built by the host constructor from members in declared order
    Aggregate,
    /// Built through an adapter factory
    Adapted,
    /// No members; only extension bindings
    Opaque,
}

/// Declaration of one host type
#[derive(Clone)]
pub struct TypeDecl {
    pub(crate) host_name: String,
    pub(crate) name_override: Option<String>,
    pub(crate) shape: DeclShape,
    pub(crate) members: Vec<MemberDecl>,
    pub(crate) builder: Option<BuildFn>,
    pub(crate) task: bool,
}

impl TypeDecl {
    fn with_shape(host_name: impl Into<String>, shape: DeclShape) -> Self {
        Self {
            host_name: host_name.into(),
            name_override: None,
            shape,
            members: Vec::new(),
            builder: None,
            task: false,
        }
    }

    /// Host type constructed directly from its members
    pub fn aggregate(host_name: impl Into<String>) -> Self {
        Self::with_shape(host_name, DeclShape::Aggregate)
    }

    /// Host type constructed through a factory; `.member` declares the
    /// factory's parameters
    pub fn adapted(host_name: impl Into<String>) -> Self {
        Self::with_shape(host_name, DeclShape::Adapted)
    }

    /// Adapter whose target type is named after the factory's return type
    pub fn adapter_for<T, F>(factory: F) -> Self
    where
        T: Any,
        F: Fn(&Arguments) -> Result<T, HostError> + Send + Sync + 'static,
    {
        Self::adapted(short_type_name::<T>()).adapter(factory)
    }

    pub fn opaque(host_name: impl Into<String>) -> Self {
        Self::with_shape(host_name, DeclShape::Opaque)
    }

    /// Override the derived DSL name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }

    pub fn member(mut self, host_ident: impl Into<String>, ty: TypeRef) -> Self {
        self.members.push(MemberDecl {
            host_ident: host_ident.into(),
            name_override: None,
            ty,
        });
        self
    }

    /// Member exposed under an explicit name
    pub fn member_as(mut self, host_ident: impl Into<String>, name: impl Into<String>, ty: TypeRef) -> Self {
        self.members.push(MemberDecl {
            host_ident: host_ident.into(),
            name_override: Some(name.into()),
            ty,
        });
        self
    }

    pub fn constructor<T, F>(mut self, construct: F) -> Self
    where
        T: Any,
        F: Fn(&Arguments) -> Result<T, HostError> + Send + Sync + 'static,
    {
        self.builder = Some(Arc::new(move |args: &Arguments| construct(args).map(HostObject::new)));
        self
    }

    pub fn adapter<T, F>(mut self, factory: F) -> Self
    where
        T: Any,
        F: Fn(&Arguments) -> Result<T, HostError> + Send + Sync + 'static,
    {
        self.builder = Some(Arc::new(move |args: &Arguments| factory(args).map(HostObject::new)));
        self
    }

    /// Objects of this type describe tasks and may carry `depends_on`
    pub fn task(mut self) -> Self {
        self.task = true;
        self
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn dsl_name(&self) -> String {
        match &self.name_override {
            Some(name) => name.clone(),
            None => convert_to_dsl_name(&self.host_name),
        }
    }
}

impl std::fmt::Debug for TypeDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDecl")
            .field("host_name", &self.host_name)
            .field("name_override", &self.name_override)
            .field("shape", &self.shape)
            .field("members", &self.members)
            .field("task", &self.task)
            .finish()
    }
}

/// Host enum; variants keep their declared order
#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub(crate) host_name: String,
    pub(crate) name_override: Option<String>,
    pub(crate) variants: Vec<String>,
}

impl EnumDecl {
    pub fn new<I, S>(host_name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            host_name: host_name.into(),
            name_override: None,
            variants: variants
                .into_iter()
                .map(|v| convert_to_dsl_name(v.as_ref()))
                .collect(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }
}

/// Free function callable from the DSL
#[derive(Clone)]
pub struct FunctionDecl {
    pub(crate) name: String,
    pub(crate) params: Vec<TypeRef>,
    pub(crate) ret: TypeRef,
    pub(crate) call: FunctionFn,
}

impl FunctionDecl {
    pub fn new<F>(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            ret,
            call: Arc::new(call),
        }
    }
}

/// Property attached to a host type from outside its declaration
#[derive(Clone)]
pub struct ExtensionPropertyDecl {
    pub(crate) target: String,
    pub(crate) name: String,
    pub(crate) ty: TypeRef,
    pub(crate) getter: GetterFn,
    pub(crate) setter: Option<SetterFn>,
}

impl ExtensionPropertyDecl {
    /// Read-only property on host type `T`
    pub fn new<T, G>(target: impl Into<String>, name: impl Into<String>, ty: TypeRef, getter: G) -> Self
    where
        T: Any,
        G: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let target = target.into();
        let expected = target.clone();
        Self {
            target,
            name: name.into(),
            ty,
            getter: Arc::new(move |host: &HostObject| {
                host.with(|value: &T| getter(value))
                    .ok_or_else(|| HostError::WrongHostType {
                        expected: expected.clone(),
                    })
            }),
            setter: None,
        }
    }

    /// Make the property writable. The setter may run any host logic and
    /// reject the value.
    pub fn setter<T, S>(mut self, setter: S) -> Self
    where
        T: Any,
        S: Fn(&mut T, Value) -> Result<(), HostError> + Send + Sync + 'static,
    {
        let expected = self.target.clone();
        self.setter = Some(Arc::new(move |host: &HostObject, value: Value| {
            host.with_mut(|target: &mut T| setter(target, value))
                .unwrap_or_else(|| {
                    Err(HostError::WrongHostType {
                        expected: expected.clone(),
                    })
                })
        }));
        self
    }
}

/// Method attached to a host type from outside its declaration
#[derive(Clone)]
pub struct ExtensionMethodDecl {
    pub(crate) target: String,
    pub(crate) name: String,
    pub(crate) params: Vec<TypeRef>,
    pub(crate) ret: TypeRef,
    pub(crate) call: MethodFn,
}

impl ExtensionMethodDecl {
    pub fn new<T, F>(
        target: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeRef>,
        ret: TypeRef,
        call: F,
    ) -> Self
    where
        T: Any,
        F: Fn(&mut T, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        let target = target.into();
        let expected = target.clone();
        Self {
            target,
            name: name.into(),
            params,
            ret,
            call: Arc::new(move |host: &HostObject, args: &[Value]| {
                host.with_mut(|receiver: &mut T| call(receiver, args))
                    .unwrap_or_else(|| {
                        Err(HostError::WrongHostType {
                            expected: expected.clone(),
                        })
                    })
            }),
        }
    }
}

/* ===================== Arguments ===================== */

/// Named argument record handed to constructors and adapters.
///
/// Values are in declared member order; absent values (from failed adapters)
/// are reported as [`HostError::MissingValue`] by the typed accessors.
#[derive(Debug, Clone)]
pub struct Arguments {
    entries: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Value at a position in declared order
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(_, v)| v)
    }

    /// The value, which may be [`Value::Absent`]
    pub fn raw(&self, name: &str) -> Result<&Value, HostError> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| HostError::MissingValue {
                member: name.to_string(),
            })
    }

    /// A present value
    pub fn get(&self, name: &str) -> Result<&Value, HostError> {
        match self.raw(name)? {
            Value::Absent => Err(HostError::MissingValue {
                member: name.to_string(),
            }),
            value => Ok(value),
        }
    }

    /// `None` when the argument is absent
    pub fn optional(&self, name: &str) -> Option<&Value> {
        match self.raw(name) {
            Ok(Value::Absent) | Err(_) => None,
            Ok(value) => Some(value),
        }
    }

    fn wrong(&self, name: &str, expected: &str, actual: &Value) -> HostError {
        HostError::WrongValue {
            member: name.to_string(),
            expected: expected.to_string(),
            actual: actual.describe(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, HostError> {
        let value = self.get(name)?;
        value.as_int().ok_or_else(|| self.wrong(name, "int", value))
    }

    pub fn float(&self, name: &str) -> Result<f64, HostError> {
        let value = self.get(name)?;
        value.as_float().ok_or_else(|| self.wrong(name, "float", value))
    }

    pub fn bool(&self, name: &str) -> Result<bool, HostError> {
        let value = self.get(name)?;
        value.as_bool().ok_or_else(|| self.wrong(name, "bool", value))
    }

    pub fn string(&self, name: &str) -> Result<String, HostError> {
        let value = self.get(name)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong(name, "string", value))
    }

    /// Elements of a list or set argument
    pub fn elements(&self, name: &str) -> Result<&[Value], HostError> {
        let value = self.get(name)?;
        value
            .as_elements()
            .ok_or_else(|| self.wrong(name, "collection", value))
    }

    pub fn strings(&self, name: &str) -> Result<Vec<String>, HostError> {
        self.elements(name)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.wrong(name, "string element", v))
            })
            .collect()
    }

    pub fn ints(&self, name: &str) -> Result<Vec<i64>, HostError> {
        self.elements(name)?
            .iter()
            .map(|v| v.as_int().ok_or_else(|| self.wrong(name, "int element", v)))
            .collect()
    }

    pub fn graph(&self, name: &str) -> Result<Rc<TaskGraph>, HostError> {
        let value = self.get(name)?;
        value
            .as_graph()
            .cloned()
            .ok_or_else(|| self.wrong(name, "graph", value))
    }

    pub fn object(&self, name: &str) -> Result<&Instance, HostError> {
        let value = self.get(name)?;
        value.as_object().ok_or_else(|| self.wrong(name, "object", value))
    }

    /// Copy of the host value behind an object argument
    pub fn host<T: Any + Clone>(&self, name: &str) -> Result<T, HostError> {
        let instance = self.object(name)?;
        instance
            .host
            .downcast_clone::<T>()
            .ok_or_else(|| HostError::WrongHostType {
                expected: short_type_name::<T>().to_string(),
            })
    }

    /// Like [`Arguments::host`], but `None` when the argument is absent
    pub fn optional_host<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, HostError> {
        match self.optional(name) {
            None => Ok(None),
            Some(_) => self.host(name).map(Some),
        }
    }
}
