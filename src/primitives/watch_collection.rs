// ============================================================================
// digest-scope - Collection Watch
// Shallow structural watching of arrays and objects
// ============================================================================
//
// A collection watch notices elements being added, removed, replaced or
// reordered, but not changes deeper than one level. It keeps its own
// shallow copy of the collection and bumps a change counter whenever the
// copy has to be patched; the counter is what the underlying identity
// watcher actually watches.
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::types::{Map, Value};
use crate::primitives::scope::Scope;
use crate::primitives::watch::{listener_fn, WatchFn, WatchHandle};
use crate::reactivity::equality::identical;

// =============================================================================
// TRACKER
// =============================================================================

/// The tracker's shallow copy of what it saw last.
enum Snapshot {
    Scalar(Value),
    List(Vec<Value>),
    Map(Map),
}

struct CollectionTracker {
    snapshot: Snapshot,
    change_count: u64,
    /// Latest value returned by the user's watch function
    new_value: Value,
    /// Shallow copy of the value passed to the previous listener call
    very_old_value: Value,
    first_invocation: bool,
}

impl CollectionTracker {
    fn new() -> Self {
        Self {
            snapshot: Snapshot::Scalar(Value::Undefined),
            change_count: 0,
            new_value: Value::Undefined,
            very_old_value: Value::Undefined,
            first_invocation: true,
        }
    }

    /// Compare `value` against the snapshot, patch the snapshot and return
    /// the change counter.
    fn observe(&mut self, value: Value) -> u64 {
        if let Some(items) = array_like_items(&value) {
            self.observe_list(items);
        } else if let Value::Object(object) = &value {
            let entries = object.borrow().clone();
            self.observe_map(entries);
        } else {
            self.observe_scalar(&value);
        }
        self.new_value = value;
        self.change_count
    }

    fn observe_list(&mut self, items: Vec<Value>) {
        let mut old = match std::mem::replace(&mut self.snapshot, Snapshot::Scalar(Value::Undefined)) {
            Snapshot::List(old) => old,
            _ => {
                self.change_count += 1;
                Vec::new()
            }
        };

        if old.len() != items.len() {
            self.change_count += 1;
            old.resize(items.len(), Value::Undefined);
        }
        for (slot, item) in old.iter_mut().zip(items) {
            if !identical(&item, slot) {
                self.change_count += 1;
                *slot = item;
            }
        }

        self.snapshot = Snapshot::List(old);
    }

    fn observe_map(&mut self, entries: Map) {
        let mut old = match std::mem::replace(&mut self.snapshot, Snapshot::Scalar(Value::Undefined)) {
            Snapshot::Map(old) => old,
            _ => {
                self.change_count += 1;
                Map::new()
            }
        };

        for (key, item) in &entries {
            match old.get_mut(key) {
                Some(slot) => {
                    if !identical(item, slot) {
                        self.change_count += 1;
                        *slot = item.clone();
                    }
                }
                None => {
                    self.change_count += 1;
                    old.insert(key.clone(), item.clone());
                }
            }
        }

        if old.len() > entries.len() {
            self.change_count += 1;
            old.retain(|key, _| entries.contains_key(key));
        }

        self.snapshot = Snapshot::Map(old);
    }

    fn observe_scalar(&mut self, value: &Value) {
        let changed = match &self.snapshot {
            Snapshot::Scalar(old) => !identical(value, old),
            _ => true,
        };
        if changed {
            self.change_count += 1;
        }
        self.snapshot = Snapshot::Scalar(value.clone());
    }

    /// Arguments for the next listener call.
    fn listener_args(&mut self) -> (Value, Value) {
        let new_value = self.new_value.clone();
        let old_value = if std::mem::replace(&mut self.first_invocation, false) {
            new_value.clone()
        } else {
            self.very_old_value.clone()
        };
        self.very_old_value = new_value.shallow_clone();
        (new_value, old_value)
    }
}

/// Elements of an array or array-like object.
///
/// An object is array-like when it has a non-negative integer `length`,
/// either `length` is 0 or the key `length - 1` exists, and it holds at
/// least `length` keys. Missing indices read as `Undefined`. A `length`
/// larger than the key count is watched as a plain mapping.
fn array_like_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(array) => Some(array.to_vec()),
        Value::Object(object) => {
            let length = object.get("length").as_f64()?;
            if length < 0.0 || length.fract() != 0.0 || length > object.len() as f64 {
                return None;
            }
            let length = length as usize;
            if length > 0 && !object.contains_key(&(length - 1).to_string()) {
                return None;
            }
            Some((0..length).map(|i| object.get(&i.to_string())).collect())
        }
        _ => None,
    }
}

// =============================================================================
// SCOPE API
// =============================================================================

impl Scope {
    /// Watch a collection shallowly.
    ///
    /// The listener receives the current value and a shallow copy of the
    /// value it received last time (the current value on the first call).
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::{array, Scope};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scope = Scope::new_root();
    /// scope.set("items", array![1, 2]);
    /// let calls = Rc::new(Cell::new(0));
    /// let calls_clone = calls.clone();
    /// scope.watch_collection(|s| s.get("items"), move |_, _, _| {
    ///     calls_clone.set(calls_clone.get() + 1);
    /// });
    /// scope.digest().unwrap();
    ///
    /// if let Some(items) = scope.get("items").as_array() {
    ///     items.push(3);
    /// }
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 2);
    /// ```
    pub fn watch_collection<W, V, L>(&self, watch: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> V + 'static,
        V: Into<Value>,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        let tracker = Rc::new(RefCell::new(CollectionTracker::new()));

        let tracking = tracker.clone();
        let internal_watch: WatchFn = Rc::new(move |scope: &Scope| {
            let value: Value = watch(scope).into();
            Value::from(tracking.borrow_mut().observe(value) as f64)
        });

        let internal_listener = listener_fn(move |_, _, scope| {
            let (new_value, old_value) = tracker.borrow_mut().listener_args();
            listener(&new_value, &old_value, scope);
        });

        self.watch_with(internal_watch, Some(internal_listener), false)
    }
}

// =============================================================================
// TESTS
// =============================================================================
