// ============================================================================
// digest-scope - Events
// Scope-level publish/subscribe: emit up the tree, broadcast down it
// ============================================================================
//
// Listeners are stored per scope and per event name, newest first, and fired
// in registration order. Firing works on a snapshot: a listener removed while
// the event is being delivered is skipped, one added is not called for the
// event in progress.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::failure::{catch_failure, FailureOrigin};
use crate::core::types::Value;
use crate::primitives::scope::{Scope, ScopeInner};

// =============================================================================
// TYPES
// =============================================================================

/// Event listener: receives the event record and the extra arguments.
pub type EventListenerFn = Rc<dyn Fn(&Event, &[Value])>;

pub(crate) struct EventListener {
    id: u64,
    callback: EventListenerFn,
    live: Cell<bool>,
}

impl EventListener {
    pub(crate) fn kill(&self) {
        self.live.set(false);
    }
}

/// Which way an event travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventDirection {
    /// From the target up through its ancestors.
    Emit,
    /// From the target down through its whole subtree.
    Broadcast,
}

// =============================================================================
// EVENT
// =============================================================================

/// The record handed to every listener of one `emit` or `broadcast`.
pub struct Event {
    name: String,
    direction: EventDirection,
    target_scope: Scope,
    current_scope: RefCell<Option<Scope>>,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl Event {
    fn new(name: &str, direction: EventDirection, target: &Scope) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            target_scope: target.clone(),
            current_scope: RefCell::new(Some(target.clone())),
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> EventDirection {
        self.direction
    }

    /// The scope `emit` or `broadcast` was called on.
    pub fn target_scope(&self) -> &Scope {
        &self.target_scope
    }

    /// The scope whose listeners are running. None once delivery is over.
    pub fn current_scope(&self) -> Option<Scope> {
        self.current_scope.borrow().clone()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    /// Only emitted events can be stopped.
    pub fn can_stop_propagation(&self) -> bool {
        self.direction == EventDirection::Emit
    }

    /// Stop an emitted event after the current scope's listeners. Has no
    /// effect on a broadcast.
    pub fn stop_propagation(&self) {
        if self.can_stop_propagation() {
            self.propagation_stopped.set(true);
        }
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    fn set_current(&self, scope: Option<&Scope>) {
        *self.current_scope.borrow_mut() = scope.cloned();
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("target_scope", &self.target_scope.id())
            .field("default_prevented", &self.default_prevented.get())
            .field("propagation_stopped", &self.propagation_stopped.get())
            .finish()
    }
}

// =============================================================================
// LISTENER HANDLE
// =============================================================================

/// Deregistration handle returned by `Scope::on`.
pub struct ListenerHandle {
    scope: Weak<ScopeInner>,
    name: String,
    id: Option<u64>,
}

impl ListenerHandle {
    /// Stop listening. Removing twice is harmless.
    pub fn remove(&self) {
        let (Some(scope), Some(id)) = (self.scope.upgrade(), self.id) else {
            return;
        };
        let removed = {
            let mut listeners = scope.listeners.borrow_mut();
            listeners.get_mut(&self.name).and_then(|list| {
                let index = list.iter().position(|l| l.id == id)?;
                Some(list.remove(index))
            })
        };
        if let Some(listener) = removed {
            listener.kill();
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

// =============================================================================
// SCOPE API
// =============================================================================

impl Scope {
    /// Listen for `name` on this scope.
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::{Scope, Value};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let root = Scope::new_root();
    /// let child = root.child();
    /// let heard = Rc::new(RefCell::new(Vec::new()));
    /// let heard_clone = heard.clone();
    /// root.on("saved", move |event, args| {
    ///     heard_clone.borrow_mut().push((event.name().to_owned(), args.to_vec()));
    /// });
    ///
    /// child.emit("saved", &[Value::from(7)]);
    ///
    /// assert_eq!(*heard.borrow(), vec![("saved".to_owned(), vec![Value::from(7)])]);
    /// ```
    pub fn on<F>(&self, name: &str, listener: F) -> ListenerHandle
    where
        F: Fn(&Event, &[Value]) + 'static,
    {
        if self.is_destroyed() {
            tracing::debug!(scope = self.id(), event = name, "listener on destroyed scope ignored");
            return ListenerHandle {
                scope: Weak::new(),
                name: name.to_owned(),
                id: None,
            };
        }

        let id = self.tree().next_id();
        self.inner
            .listeners
            .borrow_mut()
            .entry(name.to_owned())
            .or_default()
            .insert(
                0,
                Rc::new(EventListener {
                    id,
                    callback: Rc::new(listener),
                    live: Cell::new(true),
                }),
            );

        ListenerHandle {
            scope: Rc::downgrade(&self.inner),
            name: name.to_owned(),
            id: Some(id),
        }
    }

    /// Same as `handle.remove()`.
    pub fn off(&self, handle: &ListenerHandle) {
        handle.remove();
    }

    /// Number of listeners registered for `name` on this scope.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.listeners.borrow().get(name).map_or(0, Vec::len)
    }

    /// Fire `name` on this scope, then on each ancestor up to the root.
    /// Stops after the scope where a listener called `stop_propagation`.
    pub fn emit(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, EventDirection::Emit, self);
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            event.set_current(Some(&scope));
            scope.fire_event(&event, args);
            if event.propagation_stopped() {
                break;
            }
            current = scope.parent();
        }
        event.set_current(None);
        event
    }

    /// Fire `name` on this scope and every descendant, depth-first.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, EventDirection::Broadcast, self);
        self.every_scope(&mut |scope| {
            event.set_current(Some(scope));
            scope.fire_event(&event, args);
            true
        });
        event.set_current(None);
        event
    }

    fn fire_event(&self, event: &Event, args: &[Value]) {
        let listeners: Vec<Rc<EventListener>> = self
            .inner
            .listeners
            .borrow()
            .get(event.name())
            .map(|list| list.iter().rev().cloned().collect())
            .unwrap_or_default();

        let tree = self.tree();
        for listener in listeners {
            if !listener.live.get() {
                continue;
            }
            let outcome = catch_failure(FailureOrigin::EventListener, || {
                (listener.callback)(event, args)
            });
            if let Err(failure) = outcome {
                tree.report(&failure);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_in_registration_order() {
        let scope = Scope::new_root();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            scope.on("ping", move |_, _| order.borrow_mut().push(n));
        }

        scope.emit("ping", &[]);

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn other_event_names_are_not_called() {
        let scope = Scope::new_root();
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();
        scope.on("a", move |_, _| called_clone.set(true));

        scope.broadcast("b", &[]);

        assert!(!called.get());
    }

    #[test]
    fn stop_propagation_is_ignored_on_broadcast() {
        let root = Scope::new_root();
        let event = root.broadcast("x", &[]);
        event.stop_propagation();

        assert!(!event.can_stop_propagation());
        assert!(!event.propagation_stopped());
    }

    #[test]
    fn removed_handle_forgets_listener() {
        let scope = Scope::new_root();
        let handle = scope.on("x", |_, _| {});
        assert_eq!(scope.listener_count("x"), 1);

        scope.off(&handle);
        handle.remove();

        assert_eq!(scope.listener_count("x"), 0);
    }

    #[test]
    fn current_scope_is_cleared_after_delivery() {
        let root = Scope::new_root();
        let child = root.child();
        let during = Rc::new(RefCell::new(Vec::new()));
        let during_clone = during.clone();
        root.on("x", move |event, _| {
            during_clone.borrow_mut().push(event.current_scope());
        });

        let event = child.emit("x", &[]);

        assert_eq!(*during.borrow(), vec![Some(root.clone())]);
        assert_eq!(event.current_scope(), None);
        assert_eq!(event.target_scope(), &child);
    }
}
