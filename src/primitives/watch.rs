// ============================================================================
// digest-scope - Watchers
// Registration and removal of watch records on a scope
// ============================================================================
//
// A watcher pairs a value-producing function with a reaction. Scopes store
// their watchers newest-first; the digest walks that list backwards, so
// watchers are evaluated in the order they were registered.
//
// Removal works by identity and is safe in the middle of a sweep: the record
// is marked dead (the sweep works on a snapshot and skips dead records) and
// taken out of the scope's list.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::types::Value;
use crate::primitives::scope::{Scope, ScopeInner};

// =============================================================================
// TYPES
// =============================================================================

/// Identifies one watcher within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub(crate) u64);

/// Produces the watched value. Must be free of side effects.
pub type WatchFn = Rc<dyn Fn(&Scope) -> Value>;

/// Reaction called with `(new, old, scope)` when the watched value changes.
pub type ListenerFn = Rc<dyn Fn(&Value, &Value, &Scope)>;

/// Wrap a closure as a `WatchFn`, converting its result into a `Value`.
pub fn watch_fn<V, F>(f: F) -> WatchFn
where
    V: Into<Value>,
    F: Fn(&Scope) -> V + 'static,
{
    Rc::new(move |scope: &Scope| f(scope).into())
}

/// Wrap a closure as a `ListenerFn`.
pub fn listener_fn<F>(f: F) -> ListenerFn
where
    F: Fn(&Value, &Value, &Scope) + 'static,
{
    Rc::new(f)
}

// =============================================================================
// WATCHER RECORD
// =============================================================================

pub(crate) struct Watcher {
    pub(crate) id: WatchId,
    pub(crate) watch_fn: WatchFn,
    pub(crate) listener_fn: Option<ListenerFn>,
    pub(crate) value_eq: bool,

    /// Value seen by the last successful evaluation. None until the watcher
    /// has run once, which is not the same as holding `Value::Undefined`.
    pub(crate) last: RefCell<Option<Value>>,

    live: Cell<bool>,
}

impl Watcher {
    pub(crate) fn is_live(&self) -> bool {
        self.live.get()
    }

    pub(crate) fn kill(&self) {
        self.live.set(false);
    }
}

// =============================================================================
// WATCH HANDLE
// =============================================================================

/// Deregistration handle returned by the `watch*` family.
///
/// Dropping the handle does not remove anything; call `remove` (or
/// `Scope::unwatch`) to stop watching. Removing twice is harmless.
pub struct WatchHandle {
    scope: Weak<ScopeInner>,
    ids: Vec<WatchId>,
    /// Cleared on removal; composite watches use it to cancel a pending
    /// listener call that is not backed by a watcher.
    armed: Option<Rc<Cell<bool>>>,
}

impl WatchHandle {
    pub(crate) fn new(scope: &Scope, ids: Vec<WatchId>) -> Self {
        Self {
            scope: Rc::downgrade(&scope.inner),
            ids,
            armed: None,
        }
    }

    pub(crate) fn inert() -> Self {
        Self {
            scope: Weak::new(),
            ids: Vec::new(),
            armed: None,
        }
    }

    pub(crate) fn with_armed_flag(mut self, armed: Rc<Cell<bool>>) -> Self {
        self.armed = Some(armed);
        self
    }

    /// Watchers this handle removes.
    pub fn ids(&self) -> &[WatchId] {
        &self.ids
    }

    /// Stop watching.
    pub fn remove(&self) {
        if let Some(armed) = &self.armed {
            armed.set(false);
        }
        if let Some(scope) = self.scope.upgrade().map(Scope::from_inner) {
            for id in &self.ids {
                scope.remove_watcher(*id);
            }
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("ids", &self.ids).finish()
    }
}

// =============================================================================
// REGISTRATION
// =============================================================================

impl Scope {
    /// Watch a value by identity.
    ///
    /// The listener runs during a digest whenever `watch_fn` yields a value
    /// that is not identical to the last one, and once on the first digest
    /// after registration with `old == new`.
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::Scope;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scope = Scope::new_root();
    /// scope.set("value", 1);
    /// let calls = Rc::new(Cell::new(0));
    /// let calls_clone = calls.clone();
    /// scope.watch(|s| s.get("value"), move |_, _, _| calls_clone.set(calls_clone.get() + 1));
    ///
    /// scope.digest().unwrap();
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 1);
    /// ```
    pub fn watch<W, V, L>(&self, watch: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> V + 'static,
        V: Into<Value>,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.watch_with(watch_fn(watch), Some(listener_fn(listener)), false)
    }

    /// Watch a value structurally. The last value is kept as a deep copy,
    /// so mutating a watched array or object in place is a change.
    pub fn watch_value<W, V, L>(&self, watch: W, listener: L) -> WatchHandle
    where
        W: Fn(&Scope) -> V + 'static,
        V: Into<Value>,
        L: Fn(&Value, &Value, &Scope) + 'static,
    {
        self.watch_with(watch_fn(watch), Some(listener_fn(listener)), true)
    }

    /// Register a watch function with no listener. It is still evaluated on
    /// every sweep, which makes it a hook that runs once per sweep.
    pub fn observe<W, V>(&self, watch: W) -> WatchHandle
    where
        W: Fn(&Scope) -> V + 'static,
        V: Into<Value>,
    {
        self.watch_with(watch_fn(watch), None, false)
    }

    /// General form of the `watch` family.
    pub fn watch_with(
        &self,
        watch_fn: WatchFn,
        listener_fn: Option<ListenerFn>,
        value_eq: bool,
    ) -> WatchHandle {
        match self.register_watcher(watch_fn, listener_fn, value_eq) {
            Some(id) => WatchHandle::new(self, vec![id]),
            None => WatchHandle::inert(),
        }
    }

    /// Same as `handle.remove()`.
    pub fn unwatch(&self, handle: &WatchHandle) {
        handle.remove();
    }

    /// Number of live watchers on this scope (children not included).
    pub fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .borrow()
            .as_ref()
            .map_or(0, |watchers| watchers.len())
    }

    pub(crate) fn register_watcher(
        &self,
        watch_fn: WatchFn,
        listener_fn: Option<ListenerFn>,
        value_eq: bool,
    ) -> Option<WatchId> {
        let tree = self.tree();
        let mut watchers = self.inner.watchers.borrow_mut();
        let Some(watchers) = watchers.as_mut() else {
            tracing::debug!(scope = self.id(), "watch on destroyed scope ignored");
            return None;
        };

        let id = WatchId(tree.next_id());
        watchers.insert(
            0,
            Rc::new(Watcher {
                id,
                watch_fn,
                listener_fn,
                value_eq,
                last: RefCell::new(None),
                live: Cell::new(true),
            }),
        );
        self.clear_dirty_pointers();
        Some(id)
    }

    pub(crate) fn remove_watcher(&self, id: WatchId) {
        let removed = {
            let mut watchers = self.inner.watchers.borrow_mut();
            watchers.as_mut().and_then(|watchers| {
                let index = watchers.iter().position(|w| w.id == id)?;
                Some(watchers.remove(index))
            })
        };
        if let Some(watcher) = removed {
            watcher.kill();
        }
        self.clear_dirty_pointers();
    }

    /// Snapshot of the live watchers in evaluation (registration) order.
    pub(crate) fn watchers_in_sweep_order(&self) -> Vec<Rc<Watcher>> {
        self.inner
            .watchers
            .borrow()
            .as_ref()
            .map(|watchers| watchers.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// TESTS
// =============================================================================
