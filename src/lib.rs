// ============================================================================
// digest-scope - A Dirty-Checking Scope Tree for Rust
// ============================================================================
//
// Scopes hold watchers: a function producing a value plus a reaction to run
// when that value changes. A digest re-evaluates every watcher in the tree
// until a full pass sees no change, then runs work queued for after the
// tree settled. Deferred work goes through a host-provided `Scheduler`,
// callback failures go to an `ExceptionHandler`.
// ============================================================================

pub mod core;
#[macro_use]
mod macros;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use core::constants;
pub use core::{
    Array, CallbackFailure, ExceptionHandler, FailureLog, FailureOrigin, Locals,
    LogExceptionHandler, Map, Object, Phase, RootConfig, ScopeError, Value,
};

// Re-export primitives at crate root
pub use primitives::events::{Event, EventDirection, EventListenerFn, ListenerHandle};
pub use primitives::scope::Scope;
pub use primitives::watch::{listener_fn, watch_fn, ListenerFn, WatchFn, WatchHandle, WatchId};
pub use primitives::watch_group::GroupListenerFn;

// Re-export reactivity items
pub use reactivity::equality::{are_equal, deep_equals, identical};
pub use reactivity::scheduling::{ManualScheduler, Scheduler, TimerId};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn constants_match_event_and_phase_names() {
        assert_eq!(constants::DIGEST_TTL, 10);
        assert_eq!(constants::DESTROY_EVENT, "$destroy");
        assert_eq!(Phase::Digest.to_string(), constants::DIGEST_PHASE);
        assert_eq!(Phase::Apply.to_string(), constants::APPLY_PHASE);
    }

    #[test]
    fn chained_watchers_settle_in_one_digest() {
        let scope = Scope::new_root();
        scope.set("name", "Jane");

        scope.watch(
            |s| s.get("nameUpper"),
            |new, _, s| {
                if let Some(upper) = new.as_str() {
                    let initial: String = upper.chars().take(1).collect();
                    s.set("initial", format!("{initial}."));
                }
            },
        );
        scope.watch(
            |s| s.get("name"),
            |new, _, s| {
                if let Some(name) = new.as_str() {
                    s.set("nameUpper", name.to_uppercase());
                }
            },
        );

        scope.digest().unwrap();
        assert_eq!(scope.get("initial").as_str(), Some("J."));

        scope.set("name", "Bob");
        scope.digest().unwrap();
        assert_eq!(scope.get("initial").as_str(), Some("B."));
    }

    #[test]
    fn macros_build_values() {
        let value = object! { "items" => array![1, 2], "name" => "x" };
        let items = value.as_object().map(|o| o.get("items"));

        assert_eq!(items, Some(array![1, 2]));
        assert_eq!(array![], Value::from(Vec::<Value>::new()));
        assert_eq!(object! {}, Value::from(Map::new()));
    }

    #[test]
    fn scheduler_and_handler_are_pluggable() {
        let timer = ManualScheduler::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let handler = cloned!(seen => move |failure: &CallbackFailure| {
            seen.borrow_mut().push(failure.origin)
        });
        let scope = Scope::with_config(
            RootConfig::new()
                .with_scheduler(timer.clone())
                .with_exception_handler(handler),
        );

        scope.eval_async(|_| panic!("async failure"));
        assert_eq!(timer.pending(), 1);
        timer.run_pending();

        assert_eq!(*seen.borrow(), vec![FailureOrigin::AsyncTask]);
    }

    #[test]
    fn full_cycle_with_children_and_events() {
        let root = Scope::new_root();
        let child = root.child();
        let destroyed = Rc::new(Cell::new(0));

        child.on(
            constants::DESTROY_EVENT,
            cloned!(destroyed => move |_, _| destroyed.set(destroyed.get() + 1)),
        );
        child.watch(|s| s.get("value"), |_, _, _| {});
        root.set("value", 1);
        root.digest().unwrap();

        child.destroy();

        assert_eq!(destroyed.get(), 1);
        assert!(root.children().is_empty());
        assert_eq!(child.watcher_count(), 0);
    }
}
