// ============================================================================
// digest-scope - Root Configuration
// Host hooks installed when a scope tree is created
// ============================================================================

use std::fmt;
use std::rc::Rc;

use super::failure::{ExceptionHandler, LogExceptionHandler};
use crate::reactivity::scheduling::{ManualScheduler, Scheduler};

/// Options for a new scope tree.
///
/// The defaults are a private `ManualScheduler` (timers only fire if someone
/// drives it, so pass your own clone when you need to) and a
/// `LogExceptionHandler`.
///
/// # Example
///
/// ```
/// use digest_scope::{FailureLog, ManualScheduler, RootConfig, Scope};
///
/// let timer = ManualScheduler::new();
/// let failures = FailureLog::new();
/// let root = Scope::with_config(
///     RootConfig::new()
///         .with_scheduler(timer.clone())
///         .with_exception_handler(failures.clone()),
/// );
///
/// root.eval_async(|scope| scope.set("ready", true));
/// timer.run_pending();
/// assert_eq!(root.get("ready").as_bool(), Some(true));
/// ```
#[derive(Clone)]
pub struct RootConfig {
    pub(crate) scheduler: Rc<dyn Scheduler>,
    pub(crate) exception_handler: Rc<dyn ExceptionHandler>,
}

impl RootConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host timer used by `eval_async` and `apply_async`.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Rc::new(scheduler);
        self
    }

    /// Same as `with_scheduler`, for an already shared scheduler.
    pub fn with_shared_scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Sink for failures isolated during digests, drains and events.
    pub fn with_exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exception_handler = Rc::new(handler);
        self
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            scheduler: Rc::new(ManualScheduler::new()),
            exception_handler: Rc::new(LogExceptionHandler),
        }
    }
}

impl fmt::Debug for RootConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootConfig").finish_non_exhaustive()
    }
}
