// ============================================================================
// digest-scope - Watch Group
// One listener for several watch functions, called at most once per digest
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::types::Value;
use crate::primitives::scope::Scope;
use crate::primitives::watch::{listener_fn, WatchFn, WatchHandle};

/// Group listener: `(new_values, old_values, scope)`, positionally matching
/// the watch functions.
pub type GroupListenerFn = Rc<dyn Fn(&[Value], &[Value], &Scope)>;

struct GroupState {
    new_values: Vec<Value>,
    old_values: Vec<Value>,
    scheduled: bool,
    first_invocation: bool,
}

impl Scope {
    /// Watch several values with one listener.
    ///
    /// Every member is an ordinary identity watcher. When any of them
    /// changes, the group listener is queued with `eval_async`, so several
    /// changes in the same digest produce a single call. The first call
    /// passes the new values as both arguments.
    ///
    /// With no watch functions the listener is called once, asynchronously,
    /// with two empty slices, unless the handle is removed first.
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::{watch_fn, Scope};
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scope = Scope::new_root();
    /// scope.set("a", 1);
    /// scope.set("b", 2);
    /// let calls = Rc::new(Cell::new(0));
    /// let calls_clone = calls.clone();
    ///
    /// scope.watch_group(
    ///     vec![watch_fn(|s| s.get("a")), watch_fn(|s| s.get("b"))],
    ///     move |new, _, _| {
    ///         assert_eq!(new.len(), 2);
    ///         calls_clone.set(calls_clone.get() + 1);
    ///     },
    /// );
    ///
    /// scope.digest().unwrap();
    /// assert_eq!(calls.get(), 1);
    /// ```
    pub fn watch_group<F>(&self, watch_fns: Vec<WatchFn>, listener: F) -> WatchHandle
    where
        F: Fn(&[Value], &[Value], &Scope) + 'static,
    {
        let listener: GroupListenerFn = Rc::new(listener);

        if watch_fns.is_empty() {
            let armed = Rc::new(Cell::new(true));
            let should_call = armed.clone();
            self.eval_async(move |scope| {
                if should_call.get() {
                    listener(&[], &[], scope);
                }
            });
            return WatchHandle::inert().with_armed_flag(armed);
        }

        let count = watch_fns.len();
        let state = Rc::new(RefCell::new(GroupState {
            new_values: vec![Value::Undefined; count],
            old_values: vec![Value::Undefined; count],
            scheduled: false,
            first_invocation: true,
        }));

        let mut ids = Vec::with_capacity(count);
        for (index, watch) in watch_fns.into_iter().enumerate() {
            let state = state.clone();
            let listener = listener.clone();
            let member = listener_fn(move |new, old, scope| {
                let schedule = {
                    let mut group = state.borrow_mut();
                    group.new_values[index] = new.clone();
                    group.old_values[index] = old.clone();
                    !std::mem::replace(&mut group.scheduled, true)
                };
                if schedule {
                    let state = state.clone();
                    let listener = listener.clone();
                    scope.eval_async(move |scope| fire_group(&state, &listener, scope));
                }
            });
            if let Some(id) = self.register_watcher(watch, Some(member), false) {
                ids.push(id);
            }
        }

        WatchHandle::new(self, ids)
    }
}

fn fire_group(state: &RefCell<GroupState>, listener: &GroupListenerFn, scope: &Scope) {
    let (new_values, old_values) = {
        let mut group = state.borrow_mut();
        group.scheduled = false;
        let old_values = if std::mem::replace(&mut group.first_invocation, false) {
            group.new_values.clone()
        } else {
            group.old_values.clone()
        };
        (group.new_values.clone(), old_values)
    };
    listener(&new_values, &old_values, scope);
}

// =============================================================================
// TESTS
// =============================================================================
