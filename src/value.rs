//! Runtime values of the scripting language.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::FunctionDef;
use crate::container::{Scalar, TemplateContainer};
use crate::env::Env;
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::path::{BoundLink, PathValue};

pub type ObjectRef = Rc<RefCell<JsonObject>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Host function callable from scripts: `(interpreter, this, arguments)`.
pub type NativeFn = Rc<dyn Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value>>;

/// Prototype chains longer than this are treated as cyclic and end the lookup.
const MAX_PROTOTYPE_DEPTH: usize = 64;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    List(ListRef),
    Function(Rc<Callable>),
    Container(TemplateContainer),
    Link(BoundLink),
}

impl Value {
    pub fn object(object: JsonObject) -> Value {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn native(
        name: &str,
        func: impl Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Callable::Native {
            name: name.to_string(),
            func: Rc::new(func),
        }))
    }

    /// Name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Container(_) => "container",
            Value::Link(_) => "link",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The scalar a value stores as when written into a container.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Bool(b) => Some(Scalar::Boolean(*b)),
            Value::Number(n) => Some(Scalar::Number(*n)),
            Value::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::String(s) => Value::String(s),
            Scalar::Number(n) => Value::Number(n),
            Scalar::Boolean(b) => Value::Bool(b),
        }
    }
}

impl From<PathValue> for Value {
    fn from(value: PathValue) -> Self {
        match value {
            PathValue::Scalar(s) => s.into(),
            PathValue::Container(c) => Value::Container(c),
            PathValue::List(link) => Value::Link(link),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Scalars compare by value; objects, lists, functions and containers by
/// identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Container(a), Value::Container(b)) => a.ptr_eq(b),
            (Value::Link(a), Value::Link(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(o) => f.debug_map().entries(o.borrow().fields.iter()).finish(),
            Value::List(l) => f.debug_list().entries(l.borrow().iter()).finish(),
            Value::Function(c) => write!(f, "Function({})", c.name()),
            Value::Container(c) => fmt::Debug::fmt(c, f),
            Value::Link(l) => write!(f, "Link({:?})", l.link),
        }
    }
}

/// A dynamic object: ordered own fields plus an optional prototype that
/// lookups fall back to.
#[derive(Debug, Default)]
pub struct JsonObject {
    fields: IndexMap<String, Value>,
    prototype: Option<ObjectRef>,
}

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Own field, else the prototype chain's.
    pub fn get(&self, key: &str) -> Option<Value> {
        if key == "prototype" {
            return self.prototype.clone().map(Value::Object);
        }
        if let Some(value) = self.fields.get(key) {
            return Some(value.clone());
        }
        let mut next = self.prototype.clone();
        for _ in 0..MAX_PROTOTYPE_DEPTH {
            let proto = next?;
            let proto = proto.borrow();
            if let Some(value) = proto.fields.get(key) {
                return Some(value.clone());
            }
            next = proto.prototype.clone();
        }
        log::warn!("prototype chain exceeded {} links looking up `{}`", MAX_PROTOTYPE_DEPTH, key);
        None
    }

    /// Assigning `prototype` re-points the prototype instead of adding a field.
    pub fn set(&mut self, key: &str, value: Value) {
        if key == "prototype" {
            self.prototype = match value {
                Value::Object(proto) => Some(proto),
                _ => None,
            };
            return;
        }
        self.fields.insert(key.to_string(), value);
    }

    /// The `n`th own field in insertion order.
    pub fn entry_at(&self, n: usize) -> Option<(String, Value)> {
        self.fields
            .get_index(n)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Something a script can call.
pub enum Callable {
    /// A script function closed over the frame it was created in.
    Script { def: Rc<FunctionDef>, env: Env },
    Native { name: String, func: NativeFn },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Script { def, .. } => def.name.as_deref().unwrap_or("anonymous"),
            Callable::Native { name, .. } => name,
        }
    }
}
