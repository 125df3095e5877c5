// ============================================================================
// digest-scope - Scope
//
// The nodes of an observable context tree.
// ============================================================================
//
// A Scope owns watchers, event listeners, child scopes and its own state.
// Everything that is per-tree (queues, host hooks) lives in one shared
// `TreeState` that every node holds an Rc to. The phase and short-circuit
// pointer live in the `DigestState` of the node's digest root.
//
// Ownership:
// - parents own their children (strong)
// - children point back at their parent, prototype and digest root (weak)
//
// Child kinds:
// - non-isolated: state lookups fall back to the scope `new_child` was
//   called on; digests started here sweep from the inherited digest root
// - isolated: no state fallback, and the child is its own digest root
//   with its own phase and short-circuit pointer
//
// Both kinds share the tree state of their hierarchical parent. A
// non-isolated child attached to a scope of another tree takes its digest
// root from that parent, so it is swept by the tree it lives in.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::config::RootConfig;
use crate::core::constants::DESTROY_EVENT;
use crate::core::context::{DigestState, Phase, TreeState};
use crate::core::types::{Locals, Map, Value};
use crate::primitives::events::EventListener;
use crate::primitives::watch::Watcher;

// =============================================================================
// SCOPE INNER
// =============================================================================

pub(crate) struct ScopeInner {
    pub(crate) id: u64,
    pub(crate) isolated: bool,

    /// Shared per-tree state
    pub(crate) tree: Rc<TreeState>,

    /// Node whose subtree `digest()` sweeps
    pub(crate) digest_root: Weak<ScopeInner>,

    /// Phase and short-circuit pointer, shared with the digest root
    pub(crate) digest: Rc<DigestState>,

    /// Hierarchical parent (None for a root)
    pub(crate) parent: Option<Weak<ScopeInner>>,

    /// Scope whose state this one falls back to (None when isolated)
    pub(crate) prototype: Option<Weak<ScopeInner>>,

    pub(crate) children: RefCell<Vec<Scope>>,

    /// Newest first. None once destroyed.
    pub(crate) watchers: RefCell<Option<Vec<Rc<Watcher>>>>,

    /// Event name -> listeners, newest first
    pub(crate) listeners: RefCell<HashMap<String, Vec<Rc<EventListener>>>>,

    /// Own properties
    pub(crate) state: RefCell<Map>,
}

// =============================================================================
// SCOPE (Public handle)
// =============================================================================

/// Handle to a node of a scope tree.
///
/// Cloning is cheap and yields another handle to the same node. Two handles
/// compare equal when they point at the same node.
///
/// # Example
///
/// ```
/// use digest_scope::Scope;
///
/// let root = Scope::new_root();
/// root.set("greeting", "hello");
///
/// let child = root.child();
/// assert_eq!(child.get("greeting").as_str(), Some("hello"));
///
/// let isolated = root.isolated_child();
/// assert!(isolated.get("greeting").is_undefined());
/// ```
#[derive(Clone)]
pub struct Scope {
    pub(crate) inner: Rc<ScopeInner>,
}

impl Scope {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Create the root of a new tree with the default configuration.
    pub fn new_root() -> Self {
        Self::with_config(RootConfig::default())
    }

    /// Create the root of a new tree.
    pub fn with_config(config: RootConfig) -> Self {
        let tree = Rc::new(TreeState::new(config));
        let id = tree.next_id();
        let inner = Rc::new_cyclic(|weak| ScopeInner {
            id,
            isolated: false,
            tree: tree.clone(),
            digest_root: weak.clone(),
            digest: Rc::new(DigestState::new()),
            parent: None,
            prototype: None,
            children: RefCell::new(Vec::new()),
            watchers: RefCell::new(Some(Vec::new())),
            listeners: RefCell::new(HashMap::new()),
            state: RefCell::new(Map::new()),
        });
        tree.set_root(Rc::downgrade(&inner));
        tracing::debug!(scope = id, "root scope created");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// Create a child scope.
    ///
    /// The child is appended to `parent` when given, otherwise to `self`.
    /// A non-isolated child resolves missing state through `self` (even
    /// when attached elsewhere) and shares `self`'s digest root, unless
    /// `parent` belongs to another tree: then it shares `parent`'s. An
    /// isolated child has no fallback and is its own digest root.
    pub fn new_child(&self, isolated: bool, parent: Option<&Scope>) -> Scope {
        let parent = parent.unwrap_or(self);
        let tree = parent.inner.tree.clone();
        let anchor = if Rc::ptr_eq(&tree, &self.inner.tree) {
            self
        } else {
            parent
        };
        let id = tree.next_id();
        let inner = Rc::new_cyclic(|weak| ScopeInner {
            id,
            isolated,
            tree,
            digest_root: if isolated {
                weak.clone()
            } else {
                anchor.inner.digest_root.clone()
            },
            digest: if isolated {
                Rc::new(DigestState::new())
            } else {
                anchor.inner.digest.clone()
            },
            parent: Some(Rc::downgrade(&parent.inner)),
            prototype: (!isolated).then(|| Rc::downgrade(&self.inner)),
            children: RefCell::new(Vec::new()),
            watchers: RefCell::new(Some(Vec::new())),
            listeners: RefCell::new(HashMap::new()),
            state: RefCell::new(Map::new()),
        });
        let child = Scope { inner };
        parent.inner.children.borrow_mut().push(child.clone());
        tracing::trace!(scope = id, parent = parent.id(), isolated, "child scope created");
        child
    }

    /// Non-isolated child attached to `self`.
    pub fn child(&self) -> Scope {
        self.new_child(false, None)
    }

    /// Isolated child attached to `self`.
    pub fn isolated_child(&self) -> Scope {
        self.new_child(true, None)
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Look up `key` on this scope, then along the prototype chain.
    /// Missing keys read as `Value::Undefined`.
    pub fn get(&self, key: &str) -> Value {
        let mut current = Some(self.inner.clone());
        while let Some(scope) = current {
            if let Some(value) = scope.state.borrow().get(key) {
                return value.clone();
            }
            current = scope.prototype.as_ref().and_then(Weak::upgrade);
        }
        Value::Undefined
    }

    /// Set an own property, shadowing any inherited one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.borrow_mut().insert(key.into(), value.into());
    }

    /// Whether `key` is an own property of this scope.
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.state.borrow().contains_key(key)
    }

    /// Remove an own property, uncovering any inherited one.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow_mut().shift_remove(key)
    }

    /// Replace `key` with `f(current value)`; the result is an own property.
    pub fn update(&self, key: &str, f: impl FnOnce(Value) -> Value) {
        let next = f(self.get(key));
        self.set(key, next);
    }

    /// Run `expr` against this scope, synchronously.
    pub fn eval<R>(&self, expr: impl FnOnce(&Scope) -> R) -> R {
        expr(self)
    }

    /// Run `expr` against this scope with extra bindings.
    pub fn eval_with_locals<R>(
        &self,
        expr: impl FnOnce(&Scope, &Locals) -> R,
        locals: &Locals,
    ) -> R {
        expr(self, locals)
    }

    // =========================================================================
    // TRAVERSAL
    // =========================================================================

    /// Depth-first pre-order walk of this subtree. Returning false from `f`
    /// stops the walk, skipping the current scope's children too.
    ///
    /// Children are snapshotted before descending, so the tree may be
    /// changed from inside `f`.
    pub(crate) fn every_scope(&self, f: &mut dyn FnMut(&Scope) -> bool) -> bool {
        if !f(self) {
            return false;
        }
        let children = self.inner.children.borrow().clone();
        children.iter().all(|child| child.every_scope(f))
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Tear this scope down.
    ///
    /// Broadcasts `$destroy` to this subtree, detaches from the parent,
    /// discards all watchers (an in-flight sweep skips them) and clears
    /// event listeners. Calling it again does nothing.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }

        self.broadcast(DESTROY_EVENT, &[]);

        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .borrow_mut()
                .retain(|child| !child.ptr_eq(self));
        }

        let watchers = self.inner.watchers.borrow_mut().take();
        for watcher in watchers.into_iter().flatten() {
            watcher.kill();
        }
        self.clear_dirty_pointers();

        let listeners = std::mem::take(&mut *self.inner.listeners.borrow_mut());
        for listener in listeners.into_values().flatten() {
            listener.kill();
        }

        tracing::trace!(scope = self.id(), "scope destroyed");
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Tree-unique id of this scope.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Scope::from_inner)
    }

    /// Snapshot of the direct children, in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children.borrow().clone()
    }

    /// The root of the tree. Falls back to `self` if the root is gone.
    pub fn root_scope(&self) -> Scope {
        self.inner.tree.root().unwrap_or_else(|| self.clone())
    }

    /// The node whose subtree `digest()` sweeps.
    pub fn digest_root(&self) -> Scope {
        self.inner
            .digest_root
            .upgrade()
            .map(Scope::from_inner)
            .unwrap_or_else(|| self.clone())
    }

    pub fn is_isolated(&self) -> bool {
        self.inner.isolated
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.watchers.borrow().is_none()
    }

    /// The operation currently running on this scope's digest root, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.inner.digest.phase()
    }

    pub(crate) fn digest_state(&self) -> Rc<DigestState> {
        self.inner.digest.clone()
    }

    /// Forget the short-circuit pointer of this scope's digest root and of
    /// every digest root above it, since any of them may be sweeping here.
    pub(crate) fn clear_dirty_pointers(&self) {
        let mut scope = Some(self.clone());
        while let Some(current) = scope {
            current.inner.digest.set_last_dirty_watch(None);
            scope = current.parent();
        }
    }

    pub(crate) fn tree(&self) -> Rc<TreeState> {
        self.inner.tree.clone()
    }

    /// Whether both handles point at the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("isolated", &self.inner.isolated)
            .field("children", &self.inner.children.borrow().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
