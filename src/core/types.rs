// ============================================================================
// digest-scope - Type Definitions
// The dynamically typed value model observed by watchers
// ============================================================================

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

// =============================================================================
// VALUE
// =============================================================================
//
// Watch functions may return any shape of data, and the engine compares
// successive results under one of two policies (identity or deep structure).
// Scalars are plain data. Arrays and objects are shared, mutable containers:
// cloning a `Value` that holds one shares the container, so mutating it
// through any handle is visible through all of them. That is what lets a
// watcher notice `push(4)` on "the same array" under the deep policy while
// the identity policy still reports it unchanged.
// =============================================================================

/// Ordered string-keyed map used for objects, scope state and eval locals.
pub type Map = IndexMap<String, Value>;

/// Extra bindings handed to `Scope::eval_with_locals`.
pub type Locals = Map;

/// A dynamically typed value.
///
/// `PartialEq` is deep structural equality with `NaN == NaN`, the same rule
/// the value-equality watch policy uses. Identity comparison is available
/// through `reactivity::equality::identical`.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// No value at all. Distinct from `Null`.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
}

impl Value {
    /// Short lowercase name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for a number holding NaN.
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Copy containers recursively.
    ///
    /// Aliasing inside the value is preserved: a container reachable twice is
    /// copied once, and cycles are reproduced in the copy instead of looping.
    pub fn deep_clone(&self) -> Value {
        let mut seen = HashMap::new();
        self.deep_clone_with(&mut seen)
    }

    fn deep_clone_with(&self, seen: &mut HashMap<*const (), Value>) -> Value {
        match self {
            Value::Array(array) => {
                if let Some(copy) = seen.get(&array.as_ptr()) {
                    return copy.clone();
                }
                let copy = Array::new();
                seen.insert(array.as_ptr(), Value::Array(copy.clone()));
                let items: Vec<Value> = array
                    .to_vec()
                    .iter()
                    .map(|item| item.deep_clone_with(seen))
                    .collect();
                *copy.borrow_mut() = items;
                Value::Array(copy)
            }
            Value::Object(object) => {
                if let Some(copy) = seen.get(&object.as_ptr()) {
                    return copy.clone();
                }
                let copy = Object::new();
                seen.insert(object.as_ptr(), Value::Object(copy.clone()));
                let entries: Map = object
                    .entries()
                    .into_iter()
                    .map(|(key, value)| {
                        let value = value.deep_clone_with(seen);
                        (key, value)
                    })
                    .collect();
                *copy.borrow_mut() = entries;
                Value::Object(copy)
            }
            other => other.clone(),
        }
    }

    /// Copy only the outermost container; elements stay shared.
    pub fn shallow_clone(&self) -> Value {
        match self {
            Value::Array(array) => Value::Array(Array::from_vec(array.to_vec())),
            Value::Object(object) => Value::Object(Object::from_map(object.borrow().clone())),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::reactivity::equality::deep_equals(self, other)
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(value))
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(Object::from_map(value))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// =============================================================================
// ARRAY
// =============================================================================

/// Shared, mutable, identity-bearing sequence of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Store at `index`, padding with `Undefined` if it lies past the end.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.borrow_mut().pop()
    }

    /// Remove and return the element at `index`, shifting the rest down.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let mut items = self.0.borrow_mut();
        (index < items.len()).then(|| items.remove(index))
    }

    pub fn truncate(&self, len: usize) {
        self.0.borrow_mut().truncate(len);
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = FormatVisit::enter(self.as_ptr()) else {
            return f.write_str("[<cycle>]");
        };
        match self.0.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

// =============================================================================
// OBJECT
// =============================================================================

/// Shared, mutable, identity-bearing map from keys to values.
///
/// Keys keep insertion order.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<Map>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map) -> Self {
        Self(Rc::new(RefCell::new(map)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Value under `key`, or `Undefined` when the key is absent.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove `key`, keeping the order of the remaining keys.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().shift_remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Snapshot of the current entries.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn borrow(&self) -> Ref<'_, Map> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Map> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_visit) = FormatVisit::enter(self.as_ptr()) else {
            return f.write_str("{<cycle>}");
        };
        match self.0.try_borrow() {
            Ok(map) => f.debug_map().entries(map.iter()).finish(),
            Err(_) => f.write_str("{<borrowed>}"),
        }
    }
}

// =============================================================================
// DEBUG FORMATTING
// =============================================================================

thread_local! {
    /// Containers currently being formatted on this thread, outermost first.
    static FORMATTING: RefCell<Vec<*const ()>> = const { RefCell::new(Vec::new()) };
}

/// Marks a container as being formatted until dropped.
struct FormatVisit;

impl FormatVisit {
    /// `None` when the container is already being formatted further out.
    fn enter(ptr: *const ()) -> Option<Self> {
        FORMATTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&ptr) {
                None
            } else {
                stack.push(ptr);
                Some(FormatVisit)
            }
        })
    }
}

impl Drop for FormatVisit {
    fn drop(&mut self) {
        let _ = FORMATTING.try_with(|stack| stack.borrow_mut().pop());
    }
}

// =============================================================================
// TESTS
// =============================================================================
