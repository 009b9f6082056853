//! Values supplied to slots.
//!
//! [`Value`] is a closed sum type; every slot kind matches on it
//! exhaustively. Function-like values ([`Thunk`], [`Callback`]) and
//! [`Template`] results carry an identity token taken from a process-wide
//! monotonic counter, which is what the key hasher uses for them.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::skeleton::Skeleton;
use crate::tree::NodeId;
use crate::unit::UnitId;

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    List(Rc<[Value]>),
    Thunk(Thunk),
    Template(Template),
    /// A node owned by the caller; placed as-is and never freed by the engine.
    Node(NodeId),
    Callback(Callback),
}

impl Value {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Value::Text(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn thunk(func: impl Fn(&EvalScope) -> Value + 'static) -> Self {
        Value::Thunk(Thunk::new(func))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Thunk(_) => "thunk",
            Value::Template(_) => "template",
            Value::Node(_) => "node",
            Value::Callback(_) => "callback",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::Text(v) => write!(f, "Text({v:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Thunk(thunk) => write!(f, "Thunk(#{})", thunk.id()),
            Value::Template(template) => fmt::Debug::fmt(template, f),
            Value::Node(id) => write!(f, "Node({id})"),
            Value::Callback(callback) => fmt::Debug::fmt(callback, f),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value.into())
    }
}

impl From<Template> for Value {
    fn from(value: Template) -> Self {
        Value::Template(value)
    }
}

impl From<Callback> for Value {
    fn from(value: Callback) -> Self {
        Value::Callback(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Where a value is being evaluated.
///
/// Passed explicitly to every [`Thunk`] so nested reads can tell which slot
/// asked for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalScope {
    pub unit: UnitId,
    pub slot: usize,
    pub depth: usize,
}

impl EvalScope {
    pub fn new(unit: UnitId, slot: usize) -> Self {
        Self {
            unit,
            slot,
            depth: 0,
        }
    }

    pub(crate) fn nested(self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self
        }
    }
}

/// Zero-argument value producer.
#[derive(Clone)]
pub struct Thunk {
    id: u64,
    func: Rc<dyn Fn(&EvalScope) -> Value>,
}

impl Thunk {
    pub fn new(func: impl Fn(&EvalScope) -> Value + 'static) -> Self {
        Self {
            id: next_identity(),
            func: Rc::new(func),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn eval(&self, scope: &EvalScope) -> Value {
        (self.func)(scope)
    }
}

/// Event delivered to a [`Callback`].
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    /// The node whose event slot handled the event.
    pub current_target: NodeId,
    pub detail: Value,
}

/// Event handler with optional pre-bound leading arguments.
///
/// Rebinding arguments keeps the identity, so an event slot receiving the
/// same callback with new arguments only swaps the stored argument list.
#[derive(Clone)]
pub struct Callback {
    id: u64,
    func: Rc<dyn Fn(&[Value], &Event)>,
    args: Rc<[Value]>,
}

impl Callback {
    pub fn new(func: impl Fn(&[Value], &Event) + 'static) -> Self {
        Self {
            id: next_identity(),
            func: Rc::new(func),
            args: Rc::from(Vec::new()),
        }
    }

    pub fn bind(&self, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            id: self.id,
            func: Rc::clone(&self.func),
            args: args.into_iter().collect(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn invoke(&self, event: &Event) {
        (self.func)(&self.args, event);
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .field("args", &self.args)
            .finish()
    }
}

/// A skeleton paired with the values for its slots.
#[derive(Clone)]
pub struct Template {
    inner: Rc<TemplateInner>,
}

struct TemplateInner {
    id: u64,
    skeleton: Rc<Skeleton>,
    values: Vec<Value>,
}

impl Template {
    pub fn new(skeleton: Rc<Skeleton>, values: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(TemplateInner {
                id: next_identity(),
                skeleton,
                values,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn skeleton(&self) -> &Rc<Skeleton> {
        &self.inner.skeleton
    }

    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("skeleton", &self.inner.skeleton.id())
            .field("values", &self.inner.values)
            .finish()
    }
}
