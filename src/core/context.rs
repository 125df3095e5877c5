// ============================================================================
// digest-scope - Tree Context
// State shared by every scope of one tree
// ============================================================================
//
// Every scope of a tree (isolated children included) holds an Rc to the same
// `TreeState`. It owns the scheduling queues and the host hooks, so no
// operation has to chase parent pointers up to the root to reach them.
//
// The phase guard and the dirty short-circuit pointer live in a
// `DigestState`, one per digest root. Non-isolated children share their
// digest root's state; an isolated child starts its own.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use super::config::RootConfig;
use super::constants::{APPLY_PHASE, DIGEST_PHASE};
use super::error::ScopeError;
use super::failure::{catch_failure, CallbackFailure, ExceptionHandler, FailureOrigin};
use crate::primitives::scope::{Scope, ScopeInner};
use crate::primitives::watch::WatchId;
use crate::reactivity::scheduling::{Scheduler, TimerId};

// =============================================================================
// PHASE
// =============================================================================

/// The operation currently holding the tree's reentrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Digest,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Digest => f.write_str(DIGEST_PHASE),
            Phase::Apply => f.write_str(APPLY_PHASE),
        }
    }
}

/// Clears the digest root's phase when dropped, on every exit path.
pub(crate) struct PhaseGuard<'a> {
    state: &'a DigestState,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.state.phase.set(None);
    }
}

// =============================================================================
// DIGEST STATE
// =============================================================================

/// Reentrancy guard and short-circuit pointer of one digest root.
#[derive(Default)]
pub(crate) struct DigestState {
    /// Operation currently running, if any
    phase: Cell<Option<Phase>>,

    /// Last watcher found dirty by the sweep in progress
    last_dirty_watch: Cell<Option<WatchId>>,
}

impl DigestState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn phase(&self) -> Option<Phase> {
        self.phase.get()
    }

    /// Enter `phase`, failing if another phase is already running.
    pub(crate) fn begin_phase(&self, phase: Phase) -> Result<PhaseGuard<'_>, ScopeError> {
        if let Some(active) = self.phase.get() {
            return Err(ScopeError::PhaseInProgress { phase: active });
        }
        self.phase.set(Some(phase));
        Ok(PhaseGuard { state: self })
    }

    pub(crate) fn last_dirty_watch(&self) -> Option<WatchId> {
        self.last_dirty_watch.get()
    }

    pub(crate) fn set_last_dirty_watch(&self, watch: Option<WatchId>) {
        self.last_dirty_watch.set(watch);
    }
}

// =============================================================================
// QUEUED TASK
// =============================================================================

/// A deferred task together with the scope it is evaluated on.
pub(crate) struct QueuedTask {
    scope: Scope,
    task: Box<dyn FnOnce(&Scope)>,
}

impl QueuedTask {
    pub(crate) fn new(scope: Scope, task: impl FnOnce(&Scope) + 'static) -> Self {
        Self {
            scope,
            task: Box::new(task),
        }
    }

    fn run(self) {
        (self.task)(&self.scope)
    }
}

// =============================================================================
// TREE STATE
// =============================================================================

/// Scheduling and bookkeeping state owned once per scope tree.
pub(crate) struct TreeState {
    /// The tree's root scope
    root: RefCell<Weak<ScopeInner>>,

    /// Source of watcher, listener and scope ids
    next_id: Cell<u64>,

    // =========================================================================
    // QUEUES
    // =========================================================================
    /// Tasks drained before every sweep
    async_queue: RefCell<VecDeque<QueuedTask>>,

    /// Tasks batched for the next apply-async flush
    apply_async_queue: RefCell<VecDeque<QueuedTask>>,

    /// Host timer driving the next apply-async flush
    apply_async_id: Cell<Option<TimerId>>,

    /// Tasks run once after the tree stabilizes
    post_digest_queue: RefCell<VecDeque<QueuedTask>>,

    // =========================================================================
    // HOST HOOKS
    // =========================================================================
    scheduler: Rc<dyn Scheduler>,
    exception_handler: Rc<dyn ExceptionHandler>,
}

impl TreeState {
    pub(crate) fn new(config: RootConfig) -> Self {
        Self {
            root: RefCell::new(Weak::new()),
            next_id: Cell::new(1),
            async_queue: RefCell::new(VecDeque::new()),
            apply_async_queue: RefCell::new(VecDeque::new()),
            apply_async_id: Cell::new(None),
            post_digest_queue: RefCell::new(VecDeque::new()),
            scheduler: config.scheduler,
            exception_handler: config.exception_handler,
        }
    }

    // =========================================================================
    // ROOT
    // =========================================================================

    pub(crate) fn set_root(&self, root: Weak<ScopeInner>) {
        *self.root.borrow_mut() = root;
    }

    pub(crate) fn root(&self) -> Option<Scope> {
        self.root.borrow().upgrade().map(Scope::from_inner)
    }

    pub(crate) fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    // =========================================================================
    // ASYNC QUEUE
    // =========================================================================

    pub(crate) fn push_async(&self, task: QueuedTask) {
        self.async_queue.borrow_mut().push_back(task);
    }

    pub(crate) fn has_async_work(&self) -> bool {
        !self.async_queue.borrow().is_empty()
    }

    fn pop_async(&self) -> Option<QueuedTask> {
        self.async_queue.borrow_mut().pop_front()
    }

    /// Run queued async tasks until the queue is empty, including tasks
    /// queued by the tasks themselves.
    pub(crate) fn drain_async_queue(&self) {
        while let Some(task) = self.pop_async() {
            self.run_isolated(FailureOrigin::AsyncTask, task);
        }
    }

    // =========================================================================
    // APPLY-ASYNC QUEUE
    // =========================================================================

    pub(crate) fn push_apply_async(&self, task: QueuedTask) {
        self.apply_async_queue.borrow_mut().push_back(task);
    }

    fn pop_apply_async(&self) -> Option<QueuedTask> {
        self.apply_async_queue.borrow_mut().pop_front()
    }

    pub(crate) fn apply_async_id(&self) -> Option<TimerId> {
        self.apply_async_id.get()
    }

    pub(crate) fn set_apply_async_id(&self, id: Option<TimerId>) {
        self.apply_async_id.set(id);
    }

    pub(crate) fn take_apply_async_id(&self) -> Option<TimerId> {
        self.apply_async_id.take()
    }

    /// Run every batched apply-async task, then forget the pending timer.
    pub(crate) fn drain_apply_async_queue(&self) {
        while let Some(task) = self.pop_apply_async() {
            self.run_isolated(FailureOrigin::ApplyAsyncTask, task);
        }
        self.apply_async_id.set(None);
    }

    // =========================================================================
    // POST-DIGEST QUEUE
    // =========================================================================

    pub(crate) fn push_post_digest(&self, task: QueuedTask) {
        self.post_digest_queue.borrow_mut().push_back(task);
    }

    fn pop_post_digest(&self) -> Option<QueuedTask> {
        self.post_digest_queue.borrow_mut().pop_front()
    }

    pub(crate) fn drain_post_digest_queue(&self) {
        while let Some(task) = self.pop_post_digest() {
            self.run_isolated(FailureOrigin::PostDigestTask, task);
        }
    }

    // =========================================================================
    // HOST HOOKS
    // =========================================================================

    pub(crate) fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.scheduler
    }

    /// Hand an isolated failure to the exception handler.
    pub(crate) fn report(&self, failure: &CallbackFailure) {
        self.exception_handler.handle(failure);
    }

    fn run_isolated(&self, origin: FailureOrigin, task: QueuedTask) {
        if let Err(failure) = catch_failure(origin, || task.run()) {
            self.report(&failure);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
