//! Runtime value types

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::graph::TaskDependencyGraph;

/// Task graph as produced by the interpreter: payloads are the built task objects
pub type TaskGraph = TaskDependencyGraph<Value>;

/// Shared handle to an instance of a host type.
///
/// The interpreter never owns what a constructor or adapter produced; the
/// handle is passed on to the host application, which downcasts it back to
/// its own type.
#[derive(Clone)]
pub struct HostObject {
    cell: Rc<RefCell<dyn Any>>,
}

impl HostObject {
    pub fn new<T: Any>(value: T) -> Self {
        let cell: Rc<RefCell<dyn Any>> = Rc::new(RefCell::new(value));
        Self { cell }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.cell.borrow().is::<T>()
    }

    /// Run `f` against the host value if it is a `T`
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let borrowed = self.cell.borrow();
        borrowed.downcast_ref::<T>().map(f)
    }

    /// Run `f` against the host value mutably if it is a `T`
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut borrowed = self.cell.borrow_mut();
        borrowed.downcast_mut::<T>().map(f)
    }

    /// Copy the host value out if it is a `T`
    pub fn downcast_clone<T: Any + Clone>(&self) -> Option<T> {
        self.with(|value: &T| value.clone())
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({:p})", Rc::as_ptr(&self.cell))
    }
}

/// A host object together with the DSL view of it
#[derive(Debug, Clone)]
pub struct Instance {
    /// DSL type the object was built as
    pub type_name: String,
    pub host: HostObject,
    /// Aggregate member values in declaration order, as supplied at construction
    pub members: Rc<[(String, Value)]>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>, host: HostObject, members: Vec<(String, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            host,
            members: members.into(),
        }
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a failed adapter; an error only once something requires it
    Absent,
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    /// Unordered; holds no two equal elements
    Set(Vec<Value>),
    /// Unordered; holds no two equal keys
    Map(Vec<(Value, Value)>),
    Enum { type_name: String, variant: String },
    Graph(Rc<TaskGraph>),
    Object(Instance),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Elements of a list or set
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) | Value::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&Rc<TaskGraph>> {
        match self {
            Value::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// Build a set, dropping later duplicates
    pub fn set_from(elements: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for element in elements {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }
        Value::Set(unique)
    }

    /// Build a map; a later entry replaces an earlier one with an equal key
    pub fn map_from(entries: Vec<(Value, Value)>) -> Value {
        let mut unique: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match unique.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => unique.push((key, value)),
            }
        }
        Value::Map(unique)
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Value::Absent => "absent value".to_string(),
            Value::None => "none".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(v) => format!("\"{}\"", v),
            Value::List(v) => format!("list of {}", v.len()),
            Value::Set(v) => format!("set of {}", v.len()),
            Value::Map(v) => format!("map of {}", v.len()),
            Value::Enum { type_name, variant } => format!("{}.{}", type_name, variant),
            Value::Graph(graph) => format!("graph of {} tasks", graph.len()),
            Value::Object(instance) => format!("{} instance", instance.type_name),
        }
    }
}

impl PartialEq for Value {
    /// Structural for data, identity for host objects and graphs
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) | (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|element| b.contains(element))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|entry| b.contains(entry))
            }
            (
                Value::Enum { type_name: at, variant: av },
                Value::Enum { type_name: bt, variant: bv },
            ) => at == bt && av == bv,
            (Value::Graph(a), Value::Graph(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.host.ptr_eq(&b.host),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
