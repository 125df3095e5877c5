// ============================================================================
// digest-scope - Digest Loop
// Re-evaluate watchers until the tree stops changing
// ============================================================================
//
// One `digest()`:
//
// 1. enter the Digest phase of the digest root and forget its
//    short-circuit pointer
// 2. flush a pending apply-async batch (cancelling its timer)
// 3. loop: drain the async queue, sweep every watcher once, and repeat
//    while the sweep was dirty or new async work appeared, at most
//    DIGEST_TTL extra times
// 4. drain the post-digest queue
//
// The short-circuit pointer remembers the last watcher found dirty. When a
// later sweep reaches that watcher and finds it clean, every watcher after
// it was already clean in the previous sweep, so the sweep stops there.
// Each digest root keeps its own pointer and phase, so a digest of an
// isolated subtree may run from inside a digest of the whole tree.
// ============================================================================

use std::rc::Rc;

use crate::core::constants::DIGEST_TTL;
use crate::core::context::{DigestState, Phase, TreeState};
use crate::core::error::ScopeError;
use crate::core::failure::{catch_failure, FailureOrigin};
use crate::primitives::scope::Scope;
use crate::primitives::watch::Watcher;
use crate::reactivity::equality::are_equal;

/// Outcome of checking one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Dirty,
    Clean,
    /// Clean, and the last watcher found dirty: the sweep can stop.
    ShortCircuit,
}

impl Scope {
    /// Run watchers until the tree stabilizes.
    ///
    /// Sweeps the subtree of this scope's digest root: the tree root for
    /// ordinary scopes, the nearest isolated ancestor (or self) otherwise.
    ///
    /// Fails with `PhaseInProgress` if a digest or apply is already running
    /// on the same digest root, and with `DigestLimitExceeded` if watchers
    /// are still changing after `DIGEST_TTL` re-runs.
    ///
    /// # Example
    ///
    /// ```
    /// use digest_scope::{Scope, ScopeError};
    ///
    /// let scope = Scope::new_root();
    /// scope.set("counter", 0);
    /// scope.watch(
    ///     |s| s.get("counter"),
    ///     |new, _, s| s.set("counter", new.as_f64().unwrap_or(0.0) + 1.0),
    /// );
    ///
    /// assert!(matches!(
    ///     scope.digest(),
    ///     Err(ScopeError::DigestLimitExceeded { .. })
    /// ));
    /// ```
    pub fn digest(&self) -> Result<(), ScopeError> {
        let tree = self.tree();
        let root = self.digest_root();
        let state = root.digest_state();
        let _phase = state.begin_phase(Phase::Digest)?;
        state.set_last_dirty_watch(None);

        if let Some(id) = tree.take_apply_async_id() {
            tree.scheduler().cancel(id);
            tracing::trace!(timer = id.as_raw(), "apply-async timer cancelled by digest");
            self.flush_apply_async();
        }

        let mut ttl = DIGEST_TTL;
        let mut sweeps = 0u32;
        loop {
            tree.drain_async_queue();
            let dirty = root.digest_once(&tree, &state);
            sweeps += 1;
            tracing::trace!(scope = root.id(), sweep = sweeps, dirty, "digest sweep");

            if !dirty && !tree.has_async_work() {
                break;
            }
            if ttl == 0 {
                tracing::warn!(
                    scope = root.id(),
                    ttl = DIGEST_TTL,
                    "digest iterations exhausted without stabilizing"
                );
                return Err(ScopeError::DigestLimitExceeded { ttl: DIGEST_TTL });
            }
            ttl -= 1;
        }

        tree.drain_post_digest_queue();
        tracing::debug!(scope = root.id(), sweeps, "digest stabilized");
        Ok(())
    }

    /// One pass over every live watcher in this subtree. Returns whether any
    /// watcher was dirty.
    fn digest_once(&self, tree: &TreeState, state: &DigestState) -> bool {
        let mut dirty = false;
        self.every_scope(&mut |scope| {
            for watcher in scope.watchers_in_sweep_order() {
                if !watcher.is_live() {
                    continue;
                }
                match check_watcher(&watcher, scope, tree, state) {
                    Check::Dirty => dirty = true,
                    Check::Clean => {}
                    Check::ShortCircuit => return false,
                }
            }
            true
        });
        dirty
    }
}

fn check_watcher(
    watcher: &Rc<Watcher>,
    scope: &Scope,
    tree: &TreeState,
    state: &DigestState,
) -> Check {
    let new_value = match catch_failure(FailureOrigin::WatchFn, || (watcher.watch_fn)(scope)) {
        Ok(value) => value,
        Err(failure) => {
            tree.report(&failure);
            return Check::Clean;
        }
    };

    let last = watcher.last.borrow().clone();
    let changed = match &last {
        None => true,
        Some(old_value) => !are_equal(&new_value, old_value, watcher.value_eq),
    };

    if !changed {
        return if state.last_dirty_watch() == Some(watcher.id) {
            Check::ShortCircuit
        } else {
            Check::Clean
        };
    }

    state.set_last_dirty_watch(Some(watcher.id));

    if let Some(listener) = &watcher.listener_fn {
        let old_value = last.as_ref().unwrap_or(&new_value);
        let outcome = catch_failure(FailureOrigin::Listener, || {
            listener(&new_value, old_value, scope)
        });
        // A failed reaction leaves the watcher as it was.
        if let Err(failure) = outcome {
            tree.report(&failure);
            return Check::Clean;
        }
    }

    *watcher.last.borrow_mut() = Some(if watcher.value_eq {
        new_value.deep_clone()
    } else {
        new_value
    });
    Check::Dirty
}

// =============================================================================
// TESTS
// =============================================================================
