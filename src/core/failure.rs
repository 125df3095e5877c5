// ============================================================================
// digest-scope - Callback Failure Isolation
// Catch, describe and report failures raised by user callbacks
// ============================================================================
//
// Every user callback the engine invokes runs under `catch_unwind`. A panic
// becomes a `CallbackFailure` handed to the tree's `ExceptionHandler`, and
// the traversal carries on with the next item.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

// =============================================================================
// FAILURE DESCRIPTION
// =============================================================================

/// Which kind of callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureOrigin {
    WatchFn,
    Listener,
    AsyncTask,
    ApplyAsyncTask,
    PostDigestTask,
    EventListener,
    /// A digest started by a host-timer callback returned an error.
    Timer,
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureOrigin::WatchFn => "watch function",
            FailureOrigin::Listener => "watch listener",
            FailureOrigin::AsyncTask => "async task",
            FailureOrigin::ApplyAsyncTask => "apply-async task",
            FailureOrigin::PostDigestTask => "post-digest task",
            FailureOrigin::EventListener => "event listener",
            FailureOrigin::Timer => "timer callback",
        };
        f.write_str(name)
    }
}

/// A failure that was caught and isolated by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    pub origin: FailureOrigin,
    pub message: String,
}

impl CallbackFailure {
    pub fn new(origin: FailureOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.origin, self.message)
    }
}

// =============================================================================
// EXCEPTION HANDLER
// =============================================================================

/// Sink for isolated callback failures.
///
/// Closures taking `&CallbackFailure` implement this trait.
pub trait ExceptionHandler {
    fn handle(&self, failure: &CallbackFailure);
}

impl<F> ExceptionHandler for F
where
    F: Fn(&CallbackFailure),
{
    fn handle(&self, failure: &CallbackFailure) {
        self(failure)
    }
}

/// Default handler: one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogExceptionHandler;

impl ExceptionHandler for LogExceptionHandler {
    fn handle(&self, failure: &CallbackFailure) {
        tracing::error!(
            origin = %failure.origin,
            message = %failure.message,
            "scope callback failed"
        );
    }
}

/// Handler that keeps every failure it receives.
///
/// Cloning shares the underlying log, so a clone can be installed on a tree
/// while the original is kept for inspection.
#[derive(Debug, Default, Clone)]
pub struct FailureLog {
    failures: Rc<RefCell<Vec<CallbackFailure>>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.failures.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.borrow().is_empty()
    }

    /// Snapshot of the recorded failures, oldest first.
    pub fn failures(&self) -> Vec<CallbackFailure> {
        self.failures.borrow().clone()
    }

    /// Origins of the recorded failures, oldest first.
    pub fn origins(&self) -> Vec<FailureOrigin> {
        self.failures.borrow().iter().map(|f| f.origin).collect()
    }

    pub fn clear(&self) {
        self.failures.borrow_mut().clear();
    }
}

impl ExceptionHandler for FailureLog {
    fn handle(&self, failure: &CallbackFailure) {
        self.failures.borrow_mut().push(failure.clone());
    }
}

// =============================================================================
// ISOLATION
// =============================================================================

/// Run `f`, turning a panic into a `CallbackFailure` tagged with `origin`.
pub(crate) fn catch_failure<R>(
    origin: FailureOrigin,
    f: impl FnOnce() -> R,
) -> Result<R, CallbackFailure> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| CallbackFailure::new(origin, panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("callback panicked with a non-string payload")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_failure_passes_values_through() {
        let result = catch_failure(FailureOrigin::AsyncTask, || 7);
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn catch_failure_captures_panic_message() {
        let result: Result<(), _> = catch_failure(FailureOrigin::Listener, || panic!("boom"));
        let failure = result.unwrap_err();
        assert_eq!(failure.origin, FailureOrigin::Listener);
        assert_eq!(failure.message, "boom");
        assert_eq!(failure.to_string(), "watch listener failed: boom");
    }

    #[test]
    fn catch_failure_captures_formatted_panic() {
        let code = 42;
        let result: Result<(), _> =
            catch_failure(FailureOrigin::WatchFn, || panic!("bad value {code}"));
        assert_eq!(result.unwrap_err().message, "bad value 42");
    }

    #[test]
    fn failure_log_records_in_order() {
        let log = FailureLog::new();
        let shared = log.clone();

        shared.handle(&CallbackFailure::new(FailureOrigin::WatchFn, "a"));
        shared.handle(&CallbackFailure::new(FailureOrigin::EventListener, "b"));

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.origins(),
            vec![FailureOrigin::WatchFn, FailureOrigin::EventListener]
        );
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn closures_are_exception_handlers() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let handler = {
            let seen = seen.clone();
            move |failure: &CallbackFailure| seen.borrow_mut().push(failure.message.clone())
        };

        handler.handle(&CallbackFailure::new(FailureOrigin::Timer, "late"));

        assert_eq!(*seen.borrow(), vec!["late".to_string()]);
    }
}
