use digest_scope::{
    cloned, FailureLog, FailureOrigin, ManualScheduler, Phase, RootConfig, Scope, ScopeError,
    Value,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Harness {
    scope: Scope,
    timer: ManualScheduler,
    failures: FailureLog,
}

fn harness() -> Harness {
    let timer = ManualScheduler::new();
    let failures = FailureLog::new();
    let scope = Scope::with_config(
        RootConfig::new()
            .with_scheduler(timer.clone())
            .with_exception_handler(failures.clone()),
    );
    Harness {
        scope,
        timer,
        failures,
    }
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

// =============================================================================
// eval / eval_with_locals
// =============================================================================

#[test]
fn eval_returns_expression_result() {
    let scope = Scope::new_root();
    scope.set("aValue", 42);

    let result = scope.eval(|s| s.get("aValue").as_f64().unwrap_or(0.0) + 2.0);

    assert_eq!(result, 44.0);
}

#[test]
fn eval_with_locals_sees_locals() {
    let scope = Scope::new_root();
    scope.set("aValue", 42);
    let mut locals = digest_scope::Locals::new();
    locals.insert("bValue".into(), Value::from(2));

    let result = scope.eval_with_locals(
        |s, l| {
            s.get("aValue").as_f64().unwrap_or(0.0)
                + l.get("bValue").and_then(Value::as_f64).unwrap_or(0.0)
        },
        &locals,
    );

    assert_eq!(result, 44.0);
}

// =============================================================================
// apply
// =============================================================================

#[test]
fn apply_runs_expression_and_digests() {
    let scope = Scope::new_root();
    scope.set("aValue", "someValue");
    let calls = counter();

    scope.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );
    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);

    scope.apply(|s| s.set("aValue", "someOtherValue")).unwrap();
    assert_eq!(calls.get(), 2);
}

#[test]
fn apply_returns_expression_value() {
    let scope = Scope::new_root();
    assert_eq!(scope.apply(|_| 7), Ok(7));
}

#[test]
fn apply_digests_from_the_root() {
    let root = Scope::new_root();
    let isolated = root.isolated_child();
    let calls = counter();

    root.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );
    isolated.apply(|_| {}).unwrap();

    assert_eq!(calls.get(), 1);
}

#[test]
fn apply_digests_even_if_expression_panics() {
    let scope = Scope::new_root();
    let calls = counter();
    scope.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        scope.apply(|_| -> () { panic!("expression failed") })
    }));

    assert!(outcome.is_err());
    assert_eq!(calls.get(), 1);
    assert_eq!(scope.phase(), None);
}

#[test]
fn apply_inside_digest_is_rejected() {
    let scope = Scope::new_root();
    let nested = Rc::new(Cell::new(None));

    scope.watch(
        |_| 1,
        cloned!(nested => move |_, _, s| nested.set(Some(s.apply(|_| ())))),
    );
    scope.digest().unwrap();

    assert_eq!(
        nested.get(),
        Some(Err(ScopeError::PhaseInProgress { phase: Phase::Digest }))
    );
}

#[test]
fn digest_inside_apply_is_rejected() {
    let scope = Scope::new_root();

    let nested = scope.apply(|s| s.digest()).unwrap();

    assert_eq!(
        nested,
        Err(ScopeError::PhaseInProgress { phase: Phase::Apply })
    );
}

#[test]
fn phase_is_reported_while_running() {
    let scope = Scope::new_root();
    let phases = Rc::new(RefCell::new(Vec::new()));

    scope.watch(
        cloned!(phases => move |s: &Scope| {
            phases.borrow_mut().push(s.phase());
            Value::Undefined
        }),
        |_, _, _| {},
    );
    scope.apply(cloned!(phases => move |s: &Scope| phases.borrow_mut().push(s.phase())))
        .unwrap();

    let phases = phases.borrow();
    assert_eq!(phases[0], Some(Phase::Apply));
    assert!(phases[1..].iter().all(|p| *p == Some(Phase::Digest)));
    assert_eq!(scope.phase(), None);
}

// =============================================================================
// eval_async
// =============================================================================

#[test]
fn eval_async_runs_later_in_same_digest() {
    let scope = Scope::new_root();
    scope.set("aValue", vec![Value::from(1), Value::from(2), Value::from(3)]);
    let evaluated = Rc::new(Cell::new(false));
    let evaluated_immediately = Rc::new(Cell::new(None));

    scope.watch(
        |s| s.get("aValue"),
        cloned!(evaluated, evaluated_immediately => move |_, _, s| {
            let evaluated_in_task = evaluated.clone();
            s.eval_async(move |_| evaluated_in_task.set(true));
            evaluated_immediately.set(Some(evaluated.get()));
        }),
    );
    scope.digest().unwrap();

    assert!(evaluated.get());
    assert_eq!(evaluated_immediately.get(), Some(false));
}

#[test]
fn eval_async_from_watch_fn_still_runs() {
    let scope = Scope::new_root();
    scope.set("aValue", 1);
    let times = counter();

    scope.watch(
        cloned!(times => move |s: &Scope| {
            if times.get() < 2 {
                let times = times.clone();
                s.eval_async(move |_| times.set(times.get() + 1));
            }
            s.get("aValue")
        }),
        |_, _, _| {},
    );
    scope.digest().unwrap();

    assert_eq!(times.get(), 2);
}

#[test]
fn eval_async_loop_from_watch_fn_hits_limit() {
    let scope = Scope::new_root();

    scope.watch(
        |s: &Scope| {
            s.eval_async(|_| {});
            s.get("aValue")
        },
        |_, _, _| {},
    );

    assert_eq!(
        scope.digest(),
        Err(ScopeError::DigestLimitExceeded { ttl: 10 })
    );
}

#[test]
fn eval_async_schedules_digest_through_timer() {
    let Harness { scope, timer, .. } = harness();
    scope.set("aValue", "abc");
    let calls = counter();

    scope.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );
    scope.eval_async(|_| {});

    assert_eq!(calls.get(), 0);
    assert_eq!(timer.pending(), 1);

    timer.run_pending();
    assert_eq!(calls.get(), 1);
}

#[test]
fn eval_async_schedules_one_timer_per_idle_period() {
    let Harness { scope, timer, .. } = harness();

    scope.eval_async(|_| {});
    scope.eval_async(|_| {});
    scope.eval_async(|_| {});

    assert_eq!(timer.pending(), 1);
}

#[test]
fn eval_async_does_not_schedule_inside_a_phase() {
    let Harness { scope, timer, .. } = harness();

    scope.apply(|s| s.eval_async(|_| {})).unwrap();

    assert_eq!(timer.pending(), 0);
}

#[test]
fn timer_does_nothing_if_queue_was_drained() {
    let Harness { scope, timer, .. } = harness();
    let sweeps = counter();
    scope.observe(cloned!(sweeps => move |_: &Scope| {
        sweeps.set(sweeps.get() + 1);
        Value::Undefined
    }));

    scope.eval_async(|_| {});
    scope.digest().unwrap();
    let after_digest = sweeps.get();

    timer.run_pending();

    assert_eq!(sweeps.get(), after_digest);
}

#[test]
fn eval_async_failures_are_isolated() {
    let Harness {
        scope,
        timer,
        failures,
    } = harness();
    let ran = Rc::new(Cell::new(false));

    scope.eval_async(|_| panic!("async failed"));
    scope.eval_async(cloned!(ran => move |_| ran.set(true)));
    timer.run_pending();

    assert!(ran.get());
    assert_eq!(failures.origins(), vec![FailureOrigin::AsyncTask]);
}

#[test]
fn eval_async_runs_on_originating_scope() {
    let root = Scope::new_root();
    let child = root.child();
    let seen = Rc::new(RefCell::new(None));

    child.eval_async(cloned!(seen => move |s| *seen.borrow_mut() = Some(s.clone())));
    root.digest().unwrap();

    assert_eq!(*seen.borrow(), Some(child));
}

// =============================================================================
// apply_async
// =============================================================================

#[test]
fn apply_async_runs_on_timer_with_digest() {
    let Harness { scope, timer, .. } = harness();
    let calls = counter();

    scope.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );
    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);

    scope.apply_async(|s| s.set("aValue", "abc"));
    assert_eq!(calls.get(), 1);

    timer.run_pending();
    assert_eq!(calls.get(), 2);
}

#[test]
fn apply_async_never_runs_in_same_cycle() {
    let Harness { scope, timer, .. } = harness();
    let async_applied = Rc::new(Cell::new(false));

    scope.watch(
        |s| s.get("aValue"),
        cloned!(async_applied => move |_, _, s| {
            let async_applied = async_applied.clone();
            s.apply_async(move |_| async_applied.set(true));
        }),
    );
    scope.digest().unwrap();

    assert!(!async_applied.get());
    timer.run_pending();
    assert!(async_applied.get());
}

#[test]
fn apply_async_batches_into_one_digest() {
    let Harness { scope, timer, .. } = harness();
    let sweeps = counter();

    scope.observe(cloned!(sweeps => move |s: &Scope| {
        sweeps.set(sweeps.get() + 1);
        s.get("aValue")
    }));
    scope.apply_async(|s| s.set("aValue", "abc"));
    scope.apply_async(|s| s.set("aValue", "def"));

    assert_eq!(timer.pending(), 1);
    timer.run_pending();

    // One digest: a dirty sweep followed by a clean one.
    assert_eq!(sweeps.get(), 2);
    assert_eq!(scope.get("aValue"), Value::from("def"));
}

#[test]
fn digest_flushes_pending_apply_async_first() {
    let Harness { scope, timer, .. } = harness();
    let calls = counter();

    scope.watch(
        |s| s.get("aValue"),
        cloned!(calls => move |_, _, _| calls.set(calls.get() + 1)),
    );
    scope.apply_async(|s| s.set("aValue", "abc"));
    scope.digest().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(scope.get("aValue"), Value::from("abc"));

    // The flush cancelled the timer.
    assert_eq!(timer.pending(), 0);
    assert_eq!(timer.run_pending(), 0);
    assert_eq!(calls.get(), 1);
}

#[test]
fn apply_async_failures_are_isolated() {
    let Harness {
        scope,
        timer,
        failures,
    } = harness();
    let ran = Rc::new(Cell::new(false));

    scope.apply_async(|_| panic!("apply-async failed"));
    scope.apply_async(cloned!(ran => move |_| ran.set(true)));
    timer.run_pending();

    assert!(ran.get());
    assert_eq!(failures.origins(), vec![FailureOrigin::ApplyAsyncTask]);
}

#[test]
fn apply_async_after_flush_schedules_again() {
    let Harness { scope, timer, .. } = harness();
    let calls = counter();

    scope.apply_async(cloned!(calls => move |_| calls.set(calls.get() + 1)));
    timer.run_pending();
    scope.apply_async(cloned!(calls => move |_| calls.set(calls.get() + 1)));

    assert_eq!(timer.pending(), 1);
    timer.run_pending();
    assert_eq!(calls.get(), 2);
}

// =============================================================================
// post_digest
// =============================================================================

#[test]
fn post_digest_runs_after_each_digest_once() {
    let scope = Scope::new_root();
    let calls = counter();

    scope.post_digest(cloned!(calls => move |_| calls.set(calls.get() + 1)));
    assert_eq!(calls.get(), 0);

    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);

    scope.digest().unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn post_digest_changes_are_not_digested() {
    let scope = Scope::new_root();
    scope.set("aValue", "original value");
    let watched = Rc::new(RefCell::new(Value::Undefined));

    scope.post_digest(|s| s.set("aValue", "changed value"));
    scope.watch(
        |s| s.get("aValue"),
        cloned!(watched => move |new, _, _| *watched.borrow_mut() = new.clone()),
    );

    scope.digest().unwrap();
    assert_eq!(*watched.borrow(), Value::from("original value"));

    scope.digest().unwrap();
    assert_eq!(*watched.borrow(), Value::from("changed value"));
}

#[test]
fn post_digest_failures_are_isolated() {
    let Harness {
        scope, failures, ..
    } = harness();
    let ran = Rc::new(Cell::new(false));

    scope.post_digest(|_| panic!("post-digest failed"));
    scope.post_digest(cloned!(ran => move |_| ran.set(true)));
    scope.digest().unwrap();

    assert!(ran.get());
    assert_eq!(failures.origins(), vec![FailureOrigin::PostDigestTask]);
}

// =============================================================================
// timer-driven digests
// =============================================================================

#[test]
fn timer_digest_errors_reach_the_exception_handler() {
    let Harness {
        scope,
        timer,
        failures,
    } = harness();
    scope.watch(
        |s| s.get("counter"),
        |new, _, s| s.set("counter", new.as_f64().unwrap_or(0.0) + 1.0),
    );

    scope.eval_async(|_| {});
    timer.run_pending();

    assert_eq!(failures.origins(), vec![FailureOrigin::Timer]);
    assert_eq!(scope.phase(), None);
}
