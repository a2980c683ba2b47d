use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

/// An indirect reference to another location in the tree.
///
/// `target_path` is resolved from the container holding the link. With
/// `list_keys` set, the link addresses those keyed children of the list
/// container found at `target_path`, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLink {
    pub target_path: String,
    pub list_keys: Option<Vec<String>>,
}

impl TemplateLink {
    pub fn to(target_path: &str) -> Self {
        TemplateLink {
            target_path: target_path.to_string(),
            list_keys: None,
        }
    }

    pub fn list(target_path: &str, keys: &[&str]) -> Self {
        TemplateLink {
            target_path: target_path.to_string(),
            list_keys: Some(keys.iter().map(|k| k.to_string()).collect()),
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_keys.is_some()
    }
}

/// What an attribute holds.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Scalar(Scalar),
    Container(TemplateContainer),
    Link(TemplateLink),
}

struct ContainerData {
    /// Non-owning back-reference; empty for the root.
    parent: Weak<RefCell<ContainerData>>,
    attributes: IndexMap<String, AttributeValue>,
    array_values: Vec<TemplateContainer>,
    array_values_map: HashMap<String, TemplateContainer>,
}

/// A node of the hierarchical data tree templates bind against.
///
/// Cloning the handle shares the node. The tree is owned top-down; a
/// child only holds a weak reference to its parent.
#[derive(Clone)]
pub struct TemplateContainer {
    inner: Rc<RefCell<ContainerData>>,
}

impl TemplateContainer {
    /// Create a root container.
    pub fn new() -> Self {
        TemplateContainer::with_parent(Weak::new())
    }

    fn with_parent(parent: Weak<RefCell<ContainerData>>) -> Self {
        TemplateContainer {
            inner: Rc::new(RefCell::new(ContainerData {
                parent,
                attributes: IndexMap::new(),
                array_values: Vec::new(),
                array_values_map: HashMap::new(),
            })),
        }
    }

    pub fn parent(&self) -> Option<TemplateContainer> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| TemplateContainer { inner })
    }

    pub fn root(&self) -> TemplateContainer {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// A container is a list iff it has array values.
    pub fn is_list(&self) -> bool {
        !self.inner.borrow().array_values.is_empty()
    }

    pub fn ptr_eq(&self, other: &TemplateContainer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Mutation ────────────────────────────────────────────────────

    pub fn add_attribute(&self, name: &str, value: impl Into<Scalar>) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.to_string(), AttributeValue::Scalar(value.into()));
    }

    /// Create a named child container and return it.
    pub fn add_child(&self, name: &str) -> TemplateContainer {
        let child = TemplateContainer::with_parent(Rc::downgrade(&self.inner));
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.to_string(), AttributeValue::Container(child.clone()));
        child
    }

    /// Append a list element and return it. Without a key the element is
    /// keyed by its position (`"0"`, `"1"`, ...).
    pub fn add_array_value(&self, key: Option<&str>) -> TemplateContainer {
        let child = TemplateContainer::with_parent(Rc::downgrade(&self.inner));
        let mut data = self.inner.borrow_mut();
        let key = match key {
            Some(k) => k.to_string(),
            None => data.array_values.len().to_string(),
        };
        data.array_values.push(child.clone());
        data.array_values_map.insert(key, child.clone());
        child
    }

    pub fn add_link(&self, name: &str, link: TemplateLink) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.to_string(), AttributeValue::Link(link));
    }

    /// Insert or replace an attribute without reparenting it, returning the
    /// previous value. Used to bind loop variables temporarily.
    pub fn set_attribute(&self, name: &str, value: AttributeValue) -> Option<AttributeValue> {
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value)
    }

    pub fn remove_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.inner.borrow_mut().attributes.shift_remove(name)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.inner.borrow().attributes.get(name).cloned()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.borrow().attributes.keys().cloned().collect()
    }

    pub fn attributes(&self) -> Vec<(String, AttributeValue)> {
        self.inner
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// List elements in insertion order.
    pub fn array_values(&self) -> Vec<TemplateContainer> {
        self.inner.borrow().array_values.clone()
    }

    /// Keys of the list elements, in insertion order.
    pub fn array_keys(&self) -> Vec<String> {
        let data = self.inner.borrow();
        data.array_values
            .iter()
            .map(|child| {
                data.array_values_map
                    .iter()
                    .find(|(_, c)| c.ptr_eq(child))
                    .map(|(k, _)| k.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn keyed(&self, key: &str) -> Option<TemplateContainer> {
        self.inner.borrow().array_values_map.get(key).cloned()
    }

    pub fn positional(&self, index: usize) -> Option<TemplateContainer> {
        self.inner.borrow().array_values.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().array_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TemplateContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TemplateContainer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for TemplateContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.borrow();
        let mut s = f.debug_struct("TemplateContainer");
        s.field("attributes", &data.attributes);
        if !data.array_values.is_empty() {
            s.field("array_values", &data.array_values);
        }
        s.finish()
    }
}
