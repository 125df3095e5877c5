// ============================================================================
// digest-scope - Scheduling
// apply / eval_async / apply_async / post_digest and the host timer hook
// ============================================================================
//
// The engine never spins its own event loop. Work that has to happen "later"
// goes through a `Scheduler`, the host's one-shot macrotask timer:
//
// - eval_async:  queue a task for the current digest, or (when idle) make
//                sure a future timer tick starts a digest to run it
// - apply_async: batch tasks; a single timer tick flushes them all inside
//                one `apply`, unless an explicit digest pulls them forward
// - post_digest: run once, after the tree reaches its fixed point
// - apply:       run a task now, then always digest from the root
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::core::context::{Phase, QueuedTask};
use crate::core::error::ScopeError;
use crate::core::failure::{CallbackFailure, FailureOrigin};
use crate::primitives::scope::Scope;

// =============================================================================
// HOST TIMER
// =============================================================================

/// Handle of a callback registered with a `Scheduler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// The host's "run this on a later turn" capability.
///
/// Implementations must not invoke `task` from inside `schedule`; the engine
/// queues the work that the callback looks for only after `schedule` returns.
/// Callbacks must run on the thread that owns the scope tree.
pub trait Scheduler {
    /// Register `task` to run on a later turn.
    fn schedule(&self, task: Box<dyn FnOnce()>) -> TimerId;

    /// Drop a registered callback if it has not run yet.
    fn cancel(&self, id: TimerId);
}

/// Deterministic scheduler driven by hand.
///
/// Callbacks wait in FIFO order until `run_pending` or `run_next` is called.
/// Clones share the same queue, so one clone can be installed on a tree and
/// another kept to advance time.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<ManualSchedulerInner>,
}

#[derive(Default)]
struct ManualSchedulerInner {
    next_id: Cell<u64>,
    queue: RefCell<VecDeque<(TimerId, Box<dyn FnOnce()>)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Run the oldest waiting callback. Returns false if there was none.
    pub fn run_next(&self) -> bool {
        let next = self.inner.queue.borrow_mut().pop_front();
        match next {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run every callback that was waiting when the call started, i.e. one
    /// host tick. Callbacks scheduled meanwhile wait for the next call;
    /// callbacks cancelled meanwhile are skipped. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let due: Vec<TimerId> = self.inner.queue.borrow().iter().map(|(id, _)| *id).collect();
        let mut ran = 0;
        for id in due {
            if let Some(task) = self.take(id) {
                task();
                ran += 1;
            }
        }
        ran
    }

    fn take(&self, id: TimerId) -> Option<Box<dyn FnOnce()>> {
        let mut queue = self.inner.queue.borrow_mut();
        let index = queue.iter().position(|(queued, _)| *queued == id)?;
        queue.remove(index).map(|(_, task)| task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.queue.borrow_mut().push_back((id, task));
        id
    }

    fn cancel(&self, id: TimerId) {
        drop(self.take(id));
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

// =============================================================================
// SCHEDULING PRIMITIVES
// =============================================================================

impl Scope {
    /// Run `expr` now, then digest the whole tree from its root.
    ///
    /// The digest runs even if `expr` panics; the panic is resumed once the
    /// digest is over. Fails with `PhaseInProgress` when this scope's digest
    /// root is already in a digest or apply, or when the root digest cannot
    /// start, and with `DigestLimitExceeded` when the
    /// follow-up digest does not stabilize.
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::Scope;
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    ///
    /// let scope = Scope::new_root();
    /// let seen = Rc::new(Cell::new(0.0));
    /// let seen_clone = seen.clone();
    /// scope.watch(
    ///     |s| s.get("count"),
    ///     move |new, _, _| seen_clone.set(new.as_f64().unwrap_or(0.0)),
    /// );
    ///
    /// scope.apply(|s| s.set("count", 3)).unwrap();
    /// assert_eq!(seen.get(), 3.0);
    /// ```
    pub fn apply<R>(&self, expr: impl FnOnce(&Scope) -> R) -> Result<R, ScopeError> {
        let state = self.digest_state();
        let outcome = {
            let _phase = state.begin_phase(Phase::Apply)?;
            panic::catch_unwind(AssertUnwindSafe(|| self.eval(expr)))
        };
        let digested = self.root_scope().digest();
        match outcome {
            Ok(value) => digested.map(|()| value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Queue `expr` to run on this scope during a digest.
    ///
    /// Inside a digest the task runs before the next sweep. Otherwise the
    /// first call of an idle period schedules one host-timer callback that
    /// digests the tree if work is still queued by then.
    pub fn eval_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let tree = self.tree();
        if self.phase().is_none() && !tree.has_async_work() {
            let root = Rc::downgrade(&self.root_scope().inner);
            let id = tree.scheduler().schedule(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope::from_inner) else {
                    return;
                };
                if root.tree().has_async_work() {
                    root.digest_from_timer();
                }
            }));
            tracing::trace!(timer = id.as_raw(), "async digest scheduled");
        }
        tree.push_async(QueuedTask::new(self.clone(), expr));
    }

    /// Batch `expr` for the next apply-async flush.
    ///
    /// The flush happens on the next host-timer tick (wrapped in `apply`, so
    /// it ends with a digest) or at the start of the next explicit
    /// `digest()`, whichever comes first. Calls made while a flush is already
    /// scheduled share that flush.
    pub fn apply_async(&self, expr: impl FnOnce(&Scope) + 'static) {
        let tree = self.tree();
        tree.push_apply_async(QueuedTask::new(self.clone(), expr));

        if tree.apply_async_id().is_none() {
            let root = Rc::downgrade(&self.root_scope().inner);
            let id = tree.scheduler().schedule(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope::from_inner) else {
                    return;
                };
                let tree = root.tree();
                // A digest that ran first has already flushed this batch.
                if tree.apply_async_id().is_none() {
                    return;
                }
                if let Err(error) = root.apply(|scope| scope.flush_apply_async()) {
                    tree.report(&CallbackFailure::new(FailureOrigin::Timer, error.to_string()));
                }
            }));
            tree.set_apply_async_id(Some(id));
            tracing::trace!(timer = id.as_raw(), "apply-async flush scheduled");
        }
    }

    /// Run `expr` once, after the next digest reaches its fixed point.
    pub fn post_digest(&self, expr: impl FnOnce(&Scope) + 'static) {
        self.tree().push_post_digest(QueuedTask::new(self.clone(), expr));
    }

    /// Run all batched apply-async tasks now.
    pub(crate) fn flush_apply_async(&self) {
        self.tree().drain_apply_async_queue();
    }

    fn digest_from_timer(&self) {
        if let Err(error) = self.digest() {
            self.tree()
                .report(&CallbackFailure::new(FailureOrigin::Timer, error.to_string()));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
