// ============================================================================
// digest-scope - Core Module
// Values, shared tree state, configuration and error types
// ============================================================================

pub mod config;
pub mod constants;
pub(crate) mod context;
pub mod error;
pub mod failure;
pub mod types;

// Re-export commonly used items
pub use config::RootConfig;
pub use constants::*;
pub use context::Phase;
pub use error::ScopeError;
pub use failure::{CallbackFailure, ExceptionHandler, FailureLog, FailureOrigin, LogExceptionHandler};
pub use types::{Array, Locals, Map, Object, Value};
